//! Composition root.
//!
//! Builds every collaborator in dependency order and runs the long-lived
//! tasks of each service until the root token is cancelled. Binaries are
//! thin wrappers over the `run_*` functions here; standalone mode runs all
//! of them in one process over the channel broker.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tonic::body::BoxBody;
use tonic::server::NamedService;
use tonic::transport::Server;
use tonic_health::server::health_reporter;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::authz::SessionAuthorizer;
use crate::bus::{init_message_bus, ConsumerGroup, MessageBus, MessagingType};
use crate::clients::{
    GrpcIamClient, GrpcInventoryClient, GrpcPaymentClient, IamClient, InventoryClient,
    PaymentClient,
};
use crate::config::Config;
use crate::events::{OrderPaidProducer, ShipAssembledProducer};
use crate::handlers::{AssemblyWorker, ShipAssembledHandler};
use crate::outbox::OutboxRelay;
use crate::proto::envoy::service::auth::v3::authorization_server::AuthorizationServer;
use crate::proto::iam::v1::iam_service_server::IamServiceServer;
use crate::proto::inventory::v1::inventory_service_server::InventoryServiceServer;
use crate::proto::payment::v1::payment_service_server::PaymentServiceServer;
use crate::services::{IamDirectory, InventoryCatalog, OrderService, PaymentGateway};
use crate::storage::{init_storage, Storage};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// gRPC tracing layer: one span per call, tagged with the proxy request id.
pub fn grpc_trace_layer() -> TraceLayer<
    tower_http::classify::SharedClassifier<tower_http::classify::GrpcErrorsAsFailures>,
    impl Fn(&http::Request<BoxBody>) -> tracing::Span + Clone,
> {
    TraceLayer::new_for_grpc().make_span_with(|request: &http::Request<BoxBody>| {
        let request_id = request
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let path = request.uri().path();
        tracing::info_span!("grpc", %request_id, %path)
    })
}

/// Serve one gRPC service plus `grpc.health.v1` until `ctx` is cancelled.
pub async fn serve_grpc<S>(service: S, addr: SocketAddr, ctx: CancellationToken) -> Result<(), BoxError>
where
    S: tower::Service<http::Request<BoxBody>, Response = http::Response<BoxBody>, Error = Infallible>
        + NamedService
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    let (mut reporter, health_service) = health_reporter();
    reporter.set_serving::<S>().await;

    info!(service = S::NAME, %addr, "gRPC server listening");
    Server::builder()
        .layer(grpc_trace_layer())
        .add_service(health_service)
        .add_service(service)
        .serve_with_shutdown(addr, ctx.cancelled_owned())
        .await?;
    info!(service = S::NAME, "gRPC server stopped");
    Ok(())
}

/// Drive every task to completion. The first failure cancels the rest.
async fn join_all(mut tasks: JoinSet<Result<(), BoxError>>, ctx: CancellationToken) -> Result<(), BoxError> {
    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let err: BoxError = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e,
            Err(e) => Box::new(e),
        };
        error!(error = %err, "Task failed, shutting down");
        ctx.cancel();
        first_error.get_or_insert(err);
    }
    first_error.map_or(Ok(()), Err)
}

fn warn_if_in_process(config: &Config) {
    if config.messaging.messaging_type == MessagingType::Channel {
        warn!("Channel messaging keeps events inside this process; use kafka to reach other services");
    }
}

// ============================================================================
// Order service
// ============================================================================

/// Everything the Order service runs.
pub struct OrderComponents {
    pub service: Arc<OrderService>,
    pub relay: OutboxRelay,
    pub ship_assembled: Arc<dyn ConsumerGroup>,
    pub handler: Arc<ShipAssembledHandler>,
}

/// Wire the Order service: storage, outbox relay and ShipAssembled consumer.
pub fn order_components(
    config: &Config,
    storage: &Storage,
    bus: &MessageBus,
    inventory: Arc<dyn InventoryClient>,
    payment: Arc<dyn PaymentClient>,
) -> Result<OrderComponents, BoxError> {
    let producer = OrderPaidProducer::new(bus.producer()?, &config.topics.order_paid);
    let relay = OutboxRelay::new(storage.outbox.clone(), producer, config.outbox.clone());

    let service = Arc::new(
        OrderService::new(
            storage.orders.clone(),
            inventory,
            payment,
            &config.topics.order_paid,
        )
        .with_outbox_notify(relay.notifier()),
    );

    let ship_assembled = bus.consumer_group(config.consumer.settings(
        &config.groups.order_ship_assembled,
        &config.topics.ship_assembled,
    ))?;
    let handler = Arc::new(ShipAssembledHandler::new(
        service.clone(),
        config.consumer.invalid_payload,
    ));

    Ok(OrderComponents {
        service,
        relay,
        ship_assembled,
        handler,
    })
}

/// Run the HTTP API, outbox relay and ShipAssembled consumer.
pub async fn run_order(config: &Config, components: OrderComponents, ctx: CancellationToken) -> Result<(), BoxError> {
    let addr = config.server.bind_addr(config.server.http_port)?;
    let OrderComponents {
        service,
        relay,
        ship_assembled,
        handler,
    } = components;

    let mut tasks: JoinSet<Result<(), BoxError>> = JoinSet::new();
    let relay_ctx = ctx.clone();
    tasks.spawn(async move {
        relay.run(relay_ctx).await;
        Ok(())
    });

    let consumer_ctx = ctx.clone();
    tasks.spawn(async move {
        ship_assembled
            .run(consumer_ctx, handler)
            .await
            .map_err(BoxError::from)
    });

    let http_ctx = ctx.clone();
    tasks.spawn(async move {
        crate::api::serve(service, addr, http_ctx)
            .await
            .map_err(BoxError::from)
    });

    join_all(tasks, ctx).await
}

/// Order binary: remote Inventory and Payment over gRPC.
pub async fn run_order_service(config: Config, ctx: CancellationToken) -> Result<(), BoxError> {
    warn_if_in_process(&config);
    let storage = init_storage(&config.storage).await?;
    let bus = init_message_bus(&config.messaging)?;

    let timeout = config.services.request_timeout();
    let inventory: Arc<dyn InventoryClient> = Arc::new(
        GrpcInventoryClient::connect(&config.services.inventory_address, timeout).await?,
    );
    let payment: Arc<dyn PaymentClient> =
        Arc::new(GrpcPaymentClient::connect(&config.services.payment_address, timeout).await?);

    let components = order_components(&config, &storage, &bus, inventory, payment)?;
    run_order(&config, components, ctx).await
}

// ============================================================================
// Assembly service
// ============================================================================

/// Consume `OrderPaid` and publish `ShipAssembled` until `ctx` is cancelled.
pub async fn run_assembly(config: &Config, bus: &MessageBus, ctx: CancellationToken) -> Result<(), BoxError> {
    let producer = ShipAssembledProducer::new(bus.producer()?, &config.topics.ship_assembled);
    let worker = Arc::new(AssemblyWorker::new(
        producer,
        config.assembly.build_duration(),
        config.consumer.invalid_payload,
    ));
    let group = bus.consumer_group(
        config
            .consumer
            .settings(&config.groups.assembly_order_paid, &config.topics.order_paid),
    )?;

    info!(
        build_duration_secs = config.assembly.build_duration_secs,
        "Assembly worker started"
    );
    group.run(ctx, worker).await?;
    Ok(())
}

/// Assembly binary.
pub async fn run_assembly_service(config: Config, ctx: CancellationToken) -> Result<(), BoxError> {
    warn_if_in_process(&config);
    let bus = init_message_bus(&config.messaging)?;
    run_assembly(&config, &bus, ctx).await
}

// ============================================================================
// Dependency services and authz
// ============================================================================

pub async fn run_inventory_service(config: Config, ctx: CancellationToken) -> Result<(), BoxError> {
    let addr = config.server.bind_addr(config.server.inventory_grpc_port)?;
    let catalog = Arc::new(InventoryCatalog::seeded());
    serve_grpc(InventoryServiceServer::from_arc(catalog), addr, ctx).await
}

pub async fn run_payment_service(config: Config, ctx: CancellationToken) -> Result<(), BoxError> {
    let addr = config.server.bind_addr(config.server.payment_grpc_port)?;
    serve_grpc(PaymentServiceServer::new(PaymentGateway::new()), addr, ctx).await
}

pub async fn run_iam_service(config: Config, ctx: CancellationToken) -> Result<(), BoxError> {
    let addr = config.server.bind_addr(config.server.iam_grpc_port)?;
    serve_grpc(IamServiceServer::new(IamDirectory::new(&config.iam)), addr, ctx).await
}

/// ext_authz binary: remote IAM over gRPC.
pub async fn run_authz_service(config: Config, ctx: CancellationToken) -> Result<(), BoxError> {
    let addr = config.server.bind_addr(config.server.authz_grpc_port)?;
    let iam: Arc<dyn IamClient> = Arc::new(
        GrpcIamClient::connect(
            &config.services.iam_address,
            config.services.request_timeout(),
        )
        .await?,
    );
    serve_grpc(AuthorizationServer::new(SessionAuthorizer::new(iam)), addr, ctx).await
}

// ============================================================================
// Standalone
// ============================================================================

/// Every service in one process, wired in-process where possible.
pub async fn run_standalone(config: Config, ctx: CancellationToken) -> Result<(), BoxError> {
    let server = &config.server;
    let inventory_addr = server.bind_addr(server.inventory_grpc_port)?;
    let payment_addr = server.bind_addr(server.payment_grpc_port)?;
    let iam_addr = server.bind_addr(server.iam_grpc_port)?;
    let authz_addr = server.bind_addr(server.authz_grpc_port)?;

    let storage = init_storage(&config.storage).await?;
    let bus = init_message_bus(&config.messaging)?;

    let catalog = Arc::new(InventoryCatalog::seeded());
    let payment = Arc::new(PaymentGateway::new());
    let iam = Arc::new(IamDirectory::new(&config.iam));

    let order = order_components(&config, &storage, &bus, catalog.clone(), payment.clone())?;

    let mut tasks: JoinSet<Result<(), BoxError>> = JoinSet::new();
    tasks.spawn(serve_grpc(
        InventoryServiceServer::from_arc(catalog),
        inventory_addr,
        ctx.clone(),
    ));
    tasks.spawn(serve_grpc(
        PaymentServiceServer::from_arc(payment),
        payment_addr,
        ctx.clone(),
    ));
    tasks.spawn(serve_grpc(
        IamServiceServer::from_arc(iam.clone()),
        iam_addr,
        ctx.clone(),
    ));
    tasks.spawn(serve_grpc(
        AuthorizationServer::new(SessionAuthorizer::new(iam)),
        authz_addr,
        ctx.clone(),
    ));

    let assembly_config = config.clone();
    let assembly_bus = bus.clone();
    let assembly_ctx = ctx.clone();
    tasks.spawn(async move { run_assembly(&assembly_config, &assembly_bus, assembly_ctx).await });

    let order_config = config.clone();
    let order_ctx = ctx.clone();
    tasks.spawn(async move { run_order(&order_config, order, order_ctx).await });

    info!(
        storage = %config.storage.storage_type,
        http_port = config.server.http_port,
        "Standalone mode started"
    );
    join_all(tasks, ctx).await
}
