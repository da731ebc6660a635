//! End-to-end order pipeline over the in-process channel broker.
//!
//! Order service, outbox relay, Assembly worker and the ShipAssembled
//! consumer all run as tasks, wired by the same composition code the
//! binaries use. Time is paused, so the 10 second build completes instantly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use shipyard::bus::{ChannelBroker, MessageBus, Producer};
use shipyard::clients::mock::{MockInventoryClient, MockPaymentClient};
use shipyard::codec;
use shipyard::config::Config;
use shipyard::domain::{Category, Order, OrderStatus, Part, PaymentMethod, ShipAssembled};
use shipyard::runtime::{order_components, run_assembly, OrderComponents};
use shipyard::services::{OrderError, OrderService};
use shipyard::storage::{InMemoryOrderStore, OutboxStore, Storage};

const TX: &str = "8b0c7d1e-5a4f-4c3b-9e2d-1f0a9b8c7d6e";

fn part(id: u128, price: i64) -> Part {
    Part {
        id: Uuid::from_u128(id),
        name: format!("part-{id}"),
        description: String::new(),
        price,
        stock_quantity: 5,
        category: Category::Engine,
        dimensions: None,
        manufacturer: None,
        tags: vec![],
        metadata: HashMap::new(),
    }
}

fn p1() -> Part {
    part(1, 100)
}

fn p2() -> Part {
    part(2, 200)
}

struct Pipeline {
    broker: ChannelBroker,
    store: Arc<InMemoryOrderStore>,
    payment: Arc<MockPaymentClient>,
    service: Arc<OrderService>,
    config: Config,
    ctx: CancellationToken,
    tasks: JoinSet<()>,
}

impl Pipeline {
    /// Build the Order side. `with_assembly` also starts the Assembly worker.
    fn start(inventory: Vec<Part>, with_assembly: bool) -> Self {
        let config = Config::default();
        let broker = ChannelBroker::new(2);
        let bus = MessageBus::Channel(broker.clone());
        let store = Arc::new(InMemoryOrderStore::new());
        let storage = Storage::from_store(store.clone());
        let payment = Arc::new(MockPaymentClient::new(TX));

        let OrderComponents {
            service,
            relay,
            ship_assembled,
            handler,
        } = order_components(
            &config,
            &storage,
            &bus,
            Arc::new(MockInventoryClient::new(inventory)),
            payment.clone(),
        )
        .unwrap();

        let ctx = CancellationToken::new();
        let mut tasks = JoinSet::new();
        tasks.spawn(relay.run(ctx.clone()));

        let consumer_ctx = ctx.clone();
        tasks.spawn(async move {
            ship_assembled.run(consumer_ctx, handler).await.unwrap();
        });

        if with_assembly {
            let assembly_config = config.clone();
            let assembly_ctx = ctx.clone();
            tasks.spawn(async move {
                run_assembly(&assembly_config, &bus, assembly_ctx).await.unwrap();
            });
        }

        Self {
            broker,
            store,
            payment,
            service,
            config,
            ctx,
            tasks,
        }
    }

    async fn wait_for_status(&self, order_id: Uuid, status: OrderStatus) -> Order {
        for _ in 0..2_000 {
            let order = self.service.get_order(order_id).await.unwrap();
            if order.status == status {
                return order;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("order {order_id} never reached {status}");
    }

    async fn shutdown(mut self) {
        self.ctx.cancel();
        while let Some(joined) = self.tasks.join_next().await {
            joined.unwrap();
        }
    }
}

// ============================================================================
// Scenario 1: create, pay, assemble
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_happy_path_create_pay_assemble() {
    let pipeline = Pipeline::start(vec![p1(), p2()], true);
    let user_id = Uuid::new_v4();

    let order = pipeline
        .service
        .create_order(user_id, vec![p1().id, p2().id])
        .await
        .unwrap();
    assert_eq!(order.total_price, 300);
    assert_eq!(order.status, OrderStatus::PendingPayment);

    let tx = pipeline
        .service
        .pay_order(order.order_id, PaymentMethod::Card)
        .await
        .unwrap();
    assert_eq!(tx, TX);

    let paid = pipeline.service.get_order(order.order_id).await.unwrap();
    assert!(matches!(paid.status, OrderStatus::Paid | OrderStatus::Assembled));
    assert_eq!(paid.transaction_id.as_deref(), Some(TX));
    assert_eq!(paid.payment_method, Some(PaymentMethod::Card));

    let assembled = pipeline
        .wait_for_status(order.order_id, OrderStatus::Assembled)
        .await;
    assert_eq!(assembled.transaction_id.as_deref(), Some(TX));

    let order_paid = pipeline
        .broker
        .messages(&pipeline.config.topics.order_paid)
        .await;
    assert_eq!(order_paid.len(), 1);
    let event = codec::decode_order_paid(&order_paid[0].value).unwrap();
    assert_eq!(event.order_id, order.order_id);
    assert_eq!(event.user_id, user_id);
    assert_eq!(event.payment_method, PaymentMethod::Card);
    assert_eq!(event.transaction_id, TX);
    assert_eq!(order_paid[0].key, event.event_id.as_bytes().to_vec());

    let ship_assembled = pipeline
        .broker
        .messages(&pipeline.config.topics.ship_assembled)
        .await;
    assert_eq!(ship_assembled.len(), 1);
    let event = codec::decode_ship_assembled(&ship_assembled[0].value).unwrap();
    assert_eq!(event.order_id, order.order_id);
    assert_eq!(event.user_id, user_id);
    assert_eq!(event.build_time_seconds, 10);

    // published records are dropped from the outbox
    assert!(pipeline.store.outbox_records().await.is_empty());
    assert!(pipeline.store.pending(10).await.unwrap().is_empty());

    pipeline.shutdown().await;
}

// ============================================================================
// Scenario 2: missing parts
// ============================================================================

#[tokio::test]
async fn test_missing_parts_persists_nothing() {
    let pipeline = Pipeline::start(vec![p1()], false);

    let err = pipeline
        .service
        .create_order(Uuid::new_v4(), vec![p1().id, p2().id])
        .await
        .unwrap_err();

    assert_eq!(
        err,
        OrderError::PartsNotFound {
            missing: vec![p2().id]
        }
    );
    assert_eq!(pipeline.store.order_count().await, 0);

    pipeline.shutdown().await;
}

// ============================================================================
// Scenario 3: cancel after pay
// ============================================================================

#[tokio::test]
async fn test_cancel_after_pay_is_rejected() {
    // no Assembly worker, so the order stays PAID
    let pipeline = Pipeline::start(vec![p1(), p2()], false);
    let order = pipeline
        .service
        .create_order(Uuid::new_v4(), vec![p1().id, p2().id])
        .await
        .unwrap();
    pipeline
        .service
        .pay_order(order.order_id, PaymentMethod::Sbp)
        .await
        .unwrap();
    let before = pipeline.service.get_order(order.order_id).await.unwrap();

    let err = pipeline
        .service
        .cancel_order(order.order_id)
        .await
        .unwrap_err();

    assert!(matches!(err, OrderError::CannotCancelPaid { .. }));
    assert_eq!(pipeline.service.get_order(order.order_id).await.unwrap(), before);
    assert_eq!(pipeline.payment.call_count().await, 1);

    pipeline.shutdown().await;
}

// ============================================================================
// Scenario 4: duplicate ShipAssembled
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_duplicate_ship_assembled_is_acked() {
    let pipeline = Pipeline::start(vec![p1()], false);
    let user_id = Uuid::new_v4();
    let order = pipeline
        .service
        .create_order(user_id, vec![p1().id])
        .await
        .unwrap();
    pipeline
        .service
        .pay_order(order.order_id, PaymentMethod::CreditCard)
        .await
        .unwrap();

    let event = ShipAssembled::new(order.order_id, user_id, 10);
    let payload = codec::encode_ship_assembled(&event).unwrap();
    let key = event.event_id.as_bytes().to_vec();
    let topic = pipeline.config.topics.ship_assembled.clone();
    pipeline.broker.send(&topic, &key, &payload).await.unwrap();
    pipeline.broker.send(&topic, &key, &payload).await.unwrap();

    let assembled = pipeline
        .wait_for_status(order.order_id, OrderStatus::Assembled)
        .await;

    // both deliveries are committed; the second changed nothing
    let group = pipeline.config.groups.order_ship_assembled.clone();
    let partition = pipeline.broker.partition_for(&key);
    for _ in 0..2_000 {
        if pipeline
            .broker
            .committed_offset(&group, &topic, partition)
            .await
            == 2
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(
        pipeline
            .broker
            .committed_offset(&group, &topic, partition)
            .await,
        2
    );
    assert_eq!(
        pipeline.service.get_order(order.order_id).await.unwrap(),
        assembled
    );

    pipeline.shutdown().await;
}

// ============================================================================
// Invariants across the flow
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancelled_order_is_never_paid_or_assembled() {
    let pipeline = Pipeline::start(vec![p1()], true);
    let order = pipeline
        .service
        .create_order(Uuid::new_v4(), vec![p1().id])
        .await
        .unwrap();
    pipeline.service.cancel_order(order.order_id).await.unwrap();

    let err = pipeline
        .service
        .pay_order(order.order_id, PaymentMethod::Card)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::NotPayable { .. }));
    assert_eq!(pipeline.payment.call_count().await, 0);

    // a stray ShipAssembled for the cancelled order is acked and ignored
    let event = ShipAssembled::new(order.order_id, order.user_id, 1);
    pipeline
        .broker
        .send(
            &pipeline.config.topics.ship_assembled,
            event.event_id.as_bytes(),
            &codec::encode_ship_assembled(&event).unwrap(),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let order = pipeline.service.get_order(order.order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert!(order.transaction_id.is_none());
    assert!(pipeline
        .broker
        .messages(&pipeline.config.topics.order_paid)
        .await
        .is_empty());

    pipeline.shutdown().await;
}
