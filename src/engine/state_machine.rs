//! Order lifecycle rules.
//!
//! ```text
//! pending -> accepted -> preparing -> ready -> dispatched -> arrived_pickup -> arrived_dropoff -> delivered
//!    \__________\___________\__________\__ cancel ____> cancelled
//!                               dispatched | arrived_* __ abort_dispatch __> cancelled
//! ```
//!
//! Pure: nothing here touches a store. Version checks belong to the store's
//! conditional update.

use chrono::{DateTime, Utc};

use crate::error::TransitionError;
use crate::models::order::{Order, OrderEvent, OrderStatus};

pub fn next_status(from: OrderStatus, event: &OrderEvent) -> Result<OrderStatus, TransitionError> {
    let to = match (from, event) {
        (OrderStatus::Pending, OrderEvent::Accept) => OrderStatus::Accepted,
        (OrderStatus::Accepted, OrderEvent::StartPreparing) => OrderStatus::Preparing,
        (OrderStatus::Preparing, OrderEvent::MarkReady) => OrderStatus::Ready,
        (OrderStatus::Ready, OrderEvent::DispatchTo { .. }) => OrderStatus::Dispatched,
        (OrderStatus::Dispatched, OrderEvent::ArrivedAtPickup) => OrderStatus::ArrivedPickup,
        (OrderStatus::ArrivedPickup, OrderEvent::ArrivedAtDropoff) => OrderStatus::ArrivedDropoff,
        (OrderStatus::ArrivedDropoff, OrderEvent::ConfirmDelivery) => OrderStatus::Delivered,
        (status, OrderEvent::Cancel) if status.is_cancellable() => OrderStatus::Cancelled,
        (status, OrderEvent::AbortDispatch) if status.is_in_flight() => OrderStatus::Cancelled,
        _ => {
            return Err(TransitionError {
                from,
                event: event.name(),
            });
        }
    };

    Ok(to)
}

/// Returns the order as it looks after `event`. The courier binding follows
/// the status: set on dispatch, kept through delivery, dropped on abort.
/// `status_version` is left for the store to advance.
pub fn transition(
    order: &Order,
    event: &OrderEvent,
    at: DateTime<Utc>,
) -> Result<Order, TransitionError> {
    let status = next_status(order.status, event)?;

    let courier_id = match event {
        OrderEvent::DispatchTo { courier_id } => Some(*courier_id),
        OrderEvent::AbortDispatch | OrderEvent::Cancel => None,
        _ => order.courier_id,
    };

    let mut next = order.clone();
    next.status = status;
    next.courier_id = courier_id;
    next.updated_at = at;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{next_status, transition};
    use crate::models::courier::GeoPoint;
    use crate::models::order::{Order, OrderEvent, OrderStatus};

    fn all_events() -> Vec<OrderEvent> {
        vec![
            OrderEvent::Accept,
            OrderEvent::StartPreparing,
            OrderEvent::MarkReady,
            OrderEvent::DispatchTo {
                courier_id: Uuid::from_u128(1),
            },
            OrderEvent::ArrivedAtPickup,
            OrderEvent::ArrivedAtDropoff,
            OrderEvent::ConfirmDelivery,
            OrderEvent::Cancel,
            OrderEvent::AbortDispatch,
        ]
    }

    fn order() -> Order {
        Order::place(
            GeoPoint::new(79.86, 6.93),
            GeoPoint::new(79.87, 6.94),
            Utc::now(),
        )
    }

    #[test]
    fn happy_path_reaches_delivered_with_courier_bound() {
        let courier_id = Uuid::from_u128(42);
        let steps = [
            (OrderEvent::Accept, OrderStatus::Accepted),
            (OrderEvent::StartPreparing, OrderStatus::Preparing),
            (OrderEvent::MarkReady, OrderStatus::Ready),
            (OrderEvent::DispatchTo { courier_id }, OrderStatus::Dispatched),
            (OrderEvent::ArrivedAtPickup, OrderStatus::ArrivedPickup),
            (OrderEvent::ArrivedAtDropoff, OrderStatus::ArrivedDropoff),
            (OrderEvent::ConfirmDelivery, OrderStatus::Delivered),
        ];

        let mut current = order();
        for (event, expected) in steps {
            current = transition(&current, &event, Utc::now()).unwrap();
            assert_eq!(current.status, expected);
            assert_eq!(current.courier_id.is_some(), expected.requires_courier());
        }
        assert_eq!(current.courier_id, Some(courier_id));
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut delivered = order();
        delivered.status = OrderStatus::Delivered;

        let err = transition(&delivered, &OrderEvent::Accept, Utc::now()).unwrap_err();
        assert_eq!(err.from, OrderStatus::Delivered);
        assert_eq!(err.event, "accept");
    }

    #[test]
    fn cancel_only_before_dispatch() {
        for status in OrderStatus::ALL {
            let result = next_status(status, &OrderEvent::Cancel);
            let allowed = matches!(
                status,
                OrderStatus::Pending
                    | OrderStatus::Accepted
                    | OrderStatus::Preparing
                    | OrderStatus::Ready
            );
            assert_eq!(result.is_ok(), allowed, "cancel from {status}");
        }
    }

    #[test]
    fn abort_dispatch_unbinds_the_courier() {
        let mut dispatched = order();
        dispatched.status = OrderStatus::ArrivedPickup;
        dispatched.courier_id = Some(Uuid::from_u128(3));

        let aborted = transition(&dispatched, &OrderEvent::AbortDispatch, Utc::now()).unwrap();
        assert_eq!(aborted.status, OrderStatus::Cancelled);
        assert_eq!(aborted.courier_id, None);

        let mut ready = order();
        ready.status = OrderStatus::Ready;
        assert!(transition(&ready, &OrderEvent::AbortDispatch, Utc::now()).is_err());
    }

    #[test]
    fn terminal_statuses_accept_nothing() {
        for status in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            for event in all_events() {
                assert!(next_status(status, &event).is_err(), "{status} + {event:?}");
            }
        }
    }

    #[test]
    fn every_accepted_move_is_forward_or_cancels() {
        for from in OrderStatus::ALL {
            for event in all_events() {
                let Ok(to) = next_status(from, &event) else {
                    continue;
                };
                match (from.rank(), to.rank()) {
                    (Some(a), Some(b)) => assert!(b > a, "{from} -> {to} moves backwards"),
                    (_, None) => assert_eq!(to, OrderStatus::Cancelled),
                    (None, Some(_)) => panic!("left cancelled via {event:?}"),
                }
            }
        }
    }

    #[test]
    fn courier_binding_tracks_status_across_all_reachable_orders() {
        let mut frontier = vec![order()];
        let mut visited = 0;

        while let Some(current) = frontier.pop() {
            visited += 1;
            assert_eq!(
                current.courier_id.is_some(),
                current.status.requires_courier(),
                "binding mismatch in {}",
                current.status
            );
            for event in all_events() {
                if let Ok(next) = transition(&current, &event, Utc::now()) {
                    frontier.push(next);
                }
            }
        }

        assert!(visited > OrderStatus::ALL.len());
    }
}
