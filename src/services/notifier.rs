use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationNotice {
    pub session_id: Uuid,
    pub phone: String,
    pub code: String,
    pub sent_at: DateTime<Utc>,
}

pub trait Notifier: Send + Sync {
    fn send_code(&self, notice: VerificationNotice);
}

#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<VerificationNotice>,
}

impl BroadcastNotifier {
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _unused_rx) = broadcast::channel(buffer_size.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VerificationNotice> {
        self.tx.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn send_code(&self, notice: VerificationNotice) {
        let session_id = notice.session_id;
        if self.tx.send(notice).is_err() {
            warn!(%session_id, "verification code not delivered: no notification subscribers");
        }
    }
}


#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{BroadcastNotifier, Notifier, VerificationNotice};

    #[tokio::test]
    async fn subscribers_receive_notices() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();

        let notice = VerificationNotice {
            session_id: Uuid::new_v4(),
            phone: "22334455".to_string(),
            code: "123456".to_string(),
            sent_at: Utc::now(),
        };
        notifier.send_code(notice.clone());

        assert_eq!(rx.recv().await.unwrap(), notice);
    }

    #[test]
    fn sending_without_subscribers_is_harmless() {
        let notifier = BroadcastNotifier::new(8);
        notifier.send_code(VerificationNotice {
            session_id: Uuid::new_v4(),
            phone: "22334455".to_string(),
            code: "123456".to_string(),
            sent_at: Utc::now(),
        });
    }
}
