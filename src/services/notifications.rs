use crate::{entities::notification, errors::ServiceError};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Reserved receiver id for platform administrators.
pub const ADMIN_RECEIVER: &str = "admin";

/// Notification target: a shop's primary seller, or the platform admin inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    Seller(Uuid),
    Admin,
}

impl Receiver {
    pub fn as_receiver_id(&self) -> String {
        match self {
            Receiver::Seller(id) => id.to_string(),
            Receiver::Admin => ADMIN_RECEIVER.to_string(),
        }
    }
}

/// Insert-only notification writer. No delivery loop and no retry: a failed
/// write propagates to the caller, which decides whether it matters.
#[derive(Clone)]
pub struct NotificationService {
    db: Arc<DatabaseConnection>,
}

impl NotificationService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, message))]
    pub async fn notify(
        &self,
        receiver: Receiver,
        creator_id: Uuid,
        title: &str,
        message: &str,
        redirect_link: &str,
    ) -> Result<notification::Model, ServiceError> {
        let model = notification::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(title.to_string()),
            message: Set(message.to_string()),
            creator_id: Set(creator_id),
            receiver_id: Set(receiver.as_receiver_id()),
            redirect_link: Set(redirect_link.to_string()),
            read: Set(false),
            created_at: Set(Utc::now()),
        };

        let created = model.insert(&*self.db).await?;
        info!(
            notification_id = %created.id,
            receiver_id = %created.receiver_id,
            "Notification created"
        );
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receiver_id_rendering() {
        let seller = Uuid::new_v4();
        assert_eq!(Receiver::Seller(seller).as_receiver_id(), seller.to_string());
        assert_eq!(Receiver::Admin.as_receiver_id(), "admin");
    }
}
