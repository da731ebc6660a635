//! Conversions between the domain model and the dependency service protos.
//!
//! Shared by the gRPC clients (decoding responses) and the in-memory
//! services (encoding responses, decoding requests).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{ClientError, Result};
use crate::domain::{
    Category, Dimensions, Identity, Manufacturer, MetadataValue, Part, PartsFilter, PaymentMethod,
    Session, User,
};
use crate::proto::iam::v1 as iam_pb;
use crate::proto::inventory::v1 as inventory_pb;
use crate::proto::payment::v1 as payment_pb;

/// Parse a UUID field, reporting the field name on failure.
pub fn parse_uuid(field: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| ClientError::InvalidArgument(format!("{field} is not a UUID: {e}")))
}

// ============================================================================
// Inventory
// ============================================================================

pub fn category_to_proto(category: Category) -> inventory_pb::Category {
    match category {
        Category::Unspecified => inventory_pb::Category::Unspecified,
        Category::Engine => inventory_pb::Category::Engine,
        Category::Fuel => inventory_pb::Category::Fuel,
        Category::Porthole => inventory_pb::Category::Porthole,
        Category::Wing => inventory_pb::Category::Wing,
    }
}

/// Unknown numeric values read as `Unspecified`.
pub fn category_from_proto(value: i32) -> Category {
    match inventory_pb::Category::try_from(value) {
        Ok(inventory_pb::Category::Engine) => Category::Engine,
        Ok(inventory_pb::Category::Fuel) => Category::Fuel,
        Ok(inventory_pb::Category::Porthole) => Category::Porthole,
        Ok(inventory_pb::Category::Wing) => Category::Wing,
        Ok(inventory_pb::Category::Unspecified) | Err(_) => Category::Unspecified,
    }
}

fn metadata_to_proto(value: &MetadataValue) -> inventory_pb::Value {
    use inventory_pb::value::Kind;

    let kind = match value {
        MetadataValue::String(s) => Kind::StringValue(s.clone()),
        MetadataValue::Int(i) => Kind::Int64Value(*i),
        MetadataValue::Double(d) => Kind::DoubleValue(*d),
        MetadataValue::Bool(b) => Kind::BoolValue(*b),
    };
    inventory_pb::Value { kind: Some(kind) }
}

fn metadata_from_proto(value: inventory_pb::Value) -> Option<MetadataValue> {
    use inventory_pb::value::Kind;

    Some(match value.kind? {
        Kind::StringValue(s) => MetadataValue::String(s),
        Kind::Int64Value(i) => MetadataValue::Int(i),
        Kind::DoubleValue(d) => MetadataValue::Double(d),
        Kind::BoolValue(b) => MetadataValue::Bool(b),
    })
}

pub fn part_to_proto(part: &Part) -> inventory_pb::Part {
    inventory_pb::Part {
        uuid: part.id.to_string(),
        name: part.name.clone(),
        description: part.description.clone(),
        price: part.price,
        stock_quantity: part.stock_quantity,
        category: category_to_proto(part.category) as i32,
        dimensions: part.dimensions.as_ref().map(|d| inventory_pb::Dimensions {
            length: d.length,
            width: d.width,
            height: d.height,
            weight: d.weight,
        }),
        manufacturer: part
            .manufacturer
            .as_ref()
            .map(|m| inventory_pb::Manufacturer {
                name: m.name.clone(),
                country: m.country.clone(),
                website: m.website.clone(),
            }),
        tags: part.tags.clone(),
        metadata: part
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), metadata_to_proto(v)))
            .collect(),
    }
}

pub fn part_from_proto(part: inventory_pb::Part) -> Result<Part> {
    Ok(Part {
        id: parse_uuid("part.uuid", &part.uuid)?,
        name: part.name,
        description: part.description,
        price: part.price,
        stock_quantity: part.stock_quantity,
        category: category_from_proto(part.category),
        dimensions: part.dimensions.map(|d| Dimensions {
            length: d.length,
            width: d.width,
            height: d.height,
            weight: d.weight,
        }),
        manufacturer: part.manufacturer.map(|m| Manufacturer {
            name: m.name,
            country: m.country,
            website: m.website,
        }),
        tags: part.tags,
        metadata: part
            .metadata
            .into_iter()
            .filter_map(|(k, v)| metadata_from_proto(v).map(|v| (k, v)))
            .collect(),
    })
}

pub fn filter_to_proto(filter: &PartsFilter) -> inventory_pb::PartsFilter {
    inventory_pb::PartsFilter {
        uuids: filter.ids.iter().map(Uuid::to_string).collect(),
        names: filter.names.clone(),
        categories: filter
            .categories
            .iter()
            .map(|c| category_to_proto(*c) as i32)
            .collect(),
        manufacturer_countries: filter.manufacturer_countries.clone(),
        tags: filter.tags.clone(),
    }
}

pub fn filter_from_proto(filter: inventory_pb::PartsFilter) -> Result<PartsFilter> {
    Ok(PartsFilter {
        ids: filter
            .uuids
            .iter()
            .map(|id| parse_uuid("filter.uuids", id))
            .collect::<Result<_>>()?,
        names: filter.names,
        categories: filter
            .categories
            .into_iter()
            .map(category_from_proto)
            .collect(),
        manufacturer_countries: filter.manufacturer_countries,
        tags: filter.tags,
    })
}

// ============================================================================
// Payment
// ============================================================================

pub fn payment_method_to_proto(method: PaymentMethod) -> payment_pb::PaymentMethod {
    match method {
        PaymentMethod::Card => payment_pb::PaymentMethod::Card,
        PaymentMethod::Sbp => payment_pb::PaymentMethod::Sbp,
        PaymentMethod::CreditCard => payment_pb::PaymentMethod::CreditCard,
        PaymentMethod::InvestorMoney => payment_pb::PaymentMethod::InvestorMoney,
    }
}

/// `UNSPECIFIED` and unknown values are rejected.
pub fn payment_method_from_proto(value: i32) -> Result<PaymentMethod> {
    match payment_pb::PaymentMethod::try_from(value) {
        Ok(payment_pb::PaymentMethod::Card) => Ok(PaymentMethod::Card),
        Ok(payment_pb::PaymentMethod::Sbp) => Ok(PaymentMethod::Sbp),
        Ok(payment_pb::PaymentMethod::CreditCard) => Ok(PaymentMethod::CreditCard),
        Ok(payment_pb::PaymentMethod::InvestorMoney) => Ok(PaymentMethod::InvestorMoney),
        Ok(payment_pb::PaymentMethod::Unspecified) | Err(_) => Err(ClientError::InvalidArgument(
            format!("unsupported payment method {value}"),
        )),
    }
}

// ============================================================================
// IAM
// ============================================================================

pub fn timestamp_to_proto(ts: &DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: ts.timestamp(),
        nanos: ts.timestamp_subsec_nanos() as i32,
    }
}

pub fn timestamp_from_proto(field: &str, ts: Option<prost_types::Timestamp>) -> Result<DateTime<Utc>> {
    let ts = ts.ok_or_else(|| ClientError::Internal(format!("{field} missing")))?;
    let nanos = u32::try_from(ts.nanos)
        .map_err(|_| ClientError::Internal(format!("{field} has negative nanos")))?;
    DateTime::from_timestamp(ts.seconds, nanos)
        .ok_or_else(|| ClientError::Internal(format!("{field} out of range")))
}

pub fn identity_to_proto(identity: &Identity) -> iam_pb::WhoamiResponse {
    iam_pb::WhoamiResponse {
        session: Some(iam_pb::Session {
            uuid: identity.session.session_id.to_string(),
            user_uuid: identity.session.user_id.to_string(),
            created_at: Some(timestamp_to_proto(&identity.session.created_at)),
            expires_at: Some(timestamp_to_proto(&identity.session.expires_at)),
        }),
        user: Some(iam_pb::User {
            uuid: identity.user.user_id.to_string(),
            info: Some(iam_pb::UserInfo {
                login: identity.user.login.clone(),
                email: identity.user.email.clone(),
            }),
        }),
    }
}

/// Malformed responses are the server's fault and read as `Internal`.
pub fn identity_from_proto(response: iam_pb::WhoamiResponse) -> Result<Identity> {
    let session = response
        .session
        .ok_or_else(|| ClientError::Internal("whoami response without session".to_string()))?;
    let user = response
        .user
        .ok_or_else(|| ClientError::Internal("whoami response without user".to_string()))?;
    let info = user.info.unwrap_or_default();

    let internal = |e: ClientError| ClientError::Internal(e.to_string());

    Ok(Identity {
        session: Session {
            session_id: parse_uuid("session.uuid", &session.uuid).map_err(internal)?,
            user_id: parse_uuid("session.user_uuid", &session.user_uuid).map_err(internal)?,
            created_at: timestamp_from_proto("session.created_at", session.created_at)?,
            expires_at: timestamp_from_proto("session.expires_at", session.expires_at)?,
        },
        user: User {
            user_id: parse_uuid("user.uuid", &user.uuid).map_err(internal)?,
            login: info.login,
            email: info.email,
        },
    })
}
