use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-recorded purchase intent, created from a cart snapshot at
/// checkout. Status transitions are owned exclusively by the payment
/// reconciliation service; nothing else writes `status`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_number: String,
    pub buyer_id: Uuid,
    pub status: OrderStatus,
    pub delivery_address: String,
    pub phone_number: String,
    #[sea_orm(nullable)]
    pub notes: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub delivery_fee: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    Items,
    #[sea_orm(has_many = "super::payment_attempt::Entity")]
    PaymentAttempts,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::BuyerId",
        to = "super::user::Column::Id"
    )]
    Buyer,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl Related<super::payment_attempt::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentAttempts.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Buyer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Order status.
///
/// `paid`, `failed` and `cancelled` are terminal for payment events:
/// duplicate or late gateway callbacks never move an order out of them.
/// The single exception is the user-initiated retry, which reopens a
/// `failed` order to `payment_pending` with a fresh payment attempt.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "payment_pending")]
    PaymentPending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    /// No further payment events are accepted once an order is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Failed | Self::Cancelled)
    }

    /// Legal transitions of the reconciliation state machine.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, PaymentPending)
                | (Pending, Cancelled)
                | (PaymentPending, Paid)
                | (PaymentPending, Failed)
                | (PaymentPending, Cancelled)
                // User-initiated retry: new attempt on the same order.
                | (Failed, PaymentPending)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;

    #[test]
    fn terminal_states() {
        assert!(Paid.is_terminal());
        assert!(Failed.is_terminal());
        assert!(Cancelled.is_terminal());
        assert!(!Pending.is_terminal());
        assert!(!PaymentPending.is_terminal());
    }

    #[test]
    fn paid_accepts_no_transitions() {
        for next in [Pending, PaymentPending, Paid, Failed, Cancelled] {
            assert!(!Paid.can_transition_to(next));
        }
    }

    #[test]
    fn cancelled_accepts_no_transitions() {
        for next in [Pending, PaymentPending, Paid, Failed, Cancelled] {
            assert!(!Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn payment_flow_transitions() {
        assert!(Pending.can_transition_to(PaymentPending));
        assert!(PaymentPending.can_transition_to(Paid));
        assert!(PaymentPending.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Paid));
    }

    #[test]
    fn cancel_allowed_before_paid_only() {
        assert!(Pending.can_transition_to(Cancelled));
        assert!(PaymentPending.can_transition_to(Cancelled));
        assert!(!Paid.can_transition_to(Cancelled));
    }

    #[test]
    fn retry_reopens_failed_order() {
        assert!(Failed.can_transition_to(PaymentPending));
        assert!(!Failed.can_transition_to(Paid));
    }
}
