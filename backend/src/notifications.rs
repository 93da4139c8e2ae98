//! The per-user notification queue.
//!
//! Notifications are always persisted; if the target user has any open
//! socket they are additionally delivered live as a `notification` event.
//! The unread count is answered from a maintained per-user counter, primed
//! lazily from the store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chess_rules::Side;
use shared::{Conclusion, NotificationCode, ServerEvent, Winner};

use crate::db::Store;
use crate::error::{ApiError, ApiResult};
use crate::hub::SocketIndex;
use crate::models::unix_now;

pub struct Notifier {
    store: Store,
    sockets: Arc<SocketIndex>,
    unread: Mutex<HashMap<i64, i64>>,
}

impl Notifier {
    pub fn new(store: Store, sockets: Arc<SocketIndex>) -> Notifier {
        Notifier {
            store,
            sockets,
            unread: Mutex::new(HashMap::new()),
        }
    }

    /// Enqueue a notification, delivering it live if the user is connected.
    pub async fn send(
        &self,
        user_id: i64,
        code: NotificationCode,
        game_id: Option<i64>,
    ) -> ApiResult<()> {
        let notification = self
            .store
            .insert_notification(user_id, code.as_str(), game_id, unix_now())
            .await?;
        {
            let mut unread = self.unread.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(count) = unread.get_mut(&user_id) {
                *count += 1;
            }
        }
        let delivered = self
            .sockets
            .deliver(user_id, &ServerEvent::Notification(notification.to_wire()?));
        tracing::debug!(user_id, code = code.as_str(), delivered, "notification enqueued");
        Ok(())
    }

    /// Unread count, O(1) after the first call per user.
    pub async fn unread_count(&self, user_id: i64) -> ApiResult<i64> {
        {
            let unread = self.unread.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(&count) = unread.get(&user_id) {
                return Ok(count);
            }
        }
        let count = self.store.unread_notification_count(user_id).await?;
        self.unread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(user_id)
            .or_insert(count);
        Ok(count)
    }

    /// Acknowledge one notification by id. Only the owner may ack.
    pub async fn ack(&self, user_id: i64, notification_id: i64) -> ApiResult<()> {
        let notification = self
            .store
            .notification(notification_id)
            .await?
            .ok_or(ApiError::NotificationNotFound)?;
        if notification.user_id != user_id {
            return Err(ApiError::NotificationNotFound);
        }
        if !notification.read {
            self.store.mark_notification_read(notification_id).await?;
            let mut unread = self.unread.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(count) = unread.get_mut(&user_id) {
                *count = (*count - 1).max(0);
            }
        }
        Ok(())
    }
}

/// The result-family notification each participant receives when a game
/// finishes.
pub fn result_codes(winner: Winner, conclusion: Conclusion) -> Vec<(Side, NotificationCode)> {
    let winning_side = match winner {
        Winner::Host => Some(Side::Host),
        Winner::Away => Some(Side::Away),
        _ => None,
    };
    match (winning_side, conclusion) {
        (Some(side), Conclusion::Checkmate) => vec![
            (side, NotificationCode::WinCheckmate),
            (side.opponent(), NotificationCode::LossCheckmate),
        ],
        (Some(side), Conclusion::Resignation) => vec![
            (side, NotificationCode::WinResign),
            (side.opponent(), NotificationCode::LossResign),
        ],
        (Some(side), Conclusion::OutOfTime) => vec![
            (side, NotificationCode::WinTime),
            (side.opponent(), NotificationCode::LossTime),
        ],
        (_, Conclusion::Stalemate) => both(NotificationCode::DrawStalemate),
        (_, Conclusion::ThreefoldRepetition) => both(NotificationCode::DrawThreefoldRepetition),
        (_, Conclusion::FiftyMoveRule) => both(NotificationCode::DrawFiftyMoveRule),
        (_, Conclusion::AgreedDraw) => both(NotificationCode::DrawAgreed),
        _ => {
            tracing::warn!(?winner, ?conclusion, "no result codes for this combination");
            Vec::new()
        }
    }
}

fn both(code: NotificationCode) -> Vec<(Side, NotificationCode)> {
    vec![(Side::Host, code), (Side::Away, code)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_conclusion_notifies_both_players_once() {
        let cases = [
            (Winner::Host, Conclusion::Checkmate),
            (Winner::Away, Conclusion::Resignation),
            (Winner::Host, Conclusion::OutOfTime),
            (Winner::Draw, Conclusion::Stalemate),
            (Winner::Draw, Conclusion::ThreefoldRepetition),
            (Winner::Draw, Conclusion::FiftyMoveRule),
            (Winner::Draw, Conclusion::AgreedDraw),
        ];
        for (winner, conclusion) in cases {
            let codes = result_codes(winner, conclusion);
            assert_eq!(codes.len(), 2, "{winner:?}/{conclusion:?}");
            assert_ne!(codes[0].0, codes[1].0, "one notification per player");
        }
    }

    #[test]
    fn winners_and_losers_get_matching_families() {
        let codes = result_codes(Winner::Away, Conclusion::OutOfTime);
        assert!(codes.contains(&(Side::Away, NotificationCode::WinTime)));
        assert!(codes.contains(&(Side::Host, NotificationCode::LossTime)));
    }
}
