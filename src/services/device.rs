use chrono::Utc;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::Device;

/// Device Credential Store: durable per-user device registrations.
pub struct DeviceStore;

impl DeviceStore {
    /// Lookup by owner and client-asserted device identifier. Decides
    /// first-registration vs. re-registration in the completion step.
    pub async fn find_device(
        db: &Database,
        user_id: &str,
        device_id: &str,
    ) -> Result<Option<Device>> {
        let device = sqlx::query_as("SELECT * FROM devices WHERE user_id = ? AND device_id = ?")
            .bind(user_id)
            .bind(device_id)
            .fetch_optional(db.pool())
            .await?;
        Ok(device)
    }

    /// Lookup by device identifier alone, for Device Authorization where no
    /// interactive session exists and the owner comes from the record itself.
    pub async fn find_by_device_id(db: &Database, device_id: &str) -> Result<Option<Device>> {
        let device = sqlx::query_as(
            "SELECT * FROM devices WHERE device_id = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(device_id)
        .fetch_optional(db.pool())
        .await?;
        Ok(device)
    }

    /// Insert a new device credential. The UNIQUE(user_id, device_id)
    /// constraint is the correctness mechanism against racing inserts; the
    /// caller's prior find is only an optimization.
    pub async fn create_device(db: &Database, device: &Device) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO devices
                (id, user_id, device_id, name, platform, password_hash, public_key,
                 metadata, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&device.id)
        .bind(&device.user_id)
        .bind(&device.device_id)
        .bind(&device.name)
        .bind(&device.platform)
        .bind(&device.password_hash)
        .bind(&device.public_key)
        .bind(&device.metadata)
        .bind(device.is_active)
        .bind(&device.created_at)
        .bind(&device.updated_at)
        .execute(db.pool())
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(AppError::DuplicateDevice)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Rotate the PIN hash in place. Touches nothing but the credential
    /// column and the update timestamp.
    pub async fn update_password(db: &Database, device_pk: &str, new_hash: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE devices SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(new_hash)
            .bind(&now)
            .bind(device_pk)
            .execute(db.pool())
            .await?;
        Ok(())
    }

    /// Rotate the public key in place
    pub async fn update_public_key(db: &Database, device_pk: &str, new_key: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE devices SET public_key = ?, updated_at = ? WHERE id = ?")
            .bind(new_key)
            .bind(&now)
            .bind(device_pk)
            .execute(db.pool())
            .await?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::sample_device;
    use super::*;
    use crate::models::InteractionMode;

    #[tokio::test]
    async fn create_and_find_round_trip() {
        let db = Database::new_in_memory().await;
        let device = sample_device("user-1", "install-abc", InteractionMode::Pin);
        DeviceStore::create_device(&db, &device).await.unwrap();

        let found = DeviceStore::find_device(&db, "user-1", "install-abc")
            .await
            .unwrap()
            .expect("device present");
        assert_eq!(found.id, device.id);
        assert_eq!(found.interaction_mode(), InteractionMode::Pin);

        assert!(DeviceStore::find_device(&db, "user-2", "install-abc")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_conflict() {
        let db = Database::new_in_memory().await;
        let first = sample_device("user-1", "install-abc", InteractionMode::Pin);
        DeviceStore::create_device(&db, &first).await.unwrap();

        let second = sample_device("user-1", "install-abc", InteractionMode::Pin);
        let err = DeviceStore::create_device(&db, &second).await;
        assert!(matches!(err, Err(AppError::DuplicateDevice)));

        // The first record is untouched by the losing insert.
        let found = DeviceStore::find_device(&db, "user-1", "install-abc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn racing_creates_leave_one_record() {
        let db = Database::new_in_memory().await;
        let a = sample_device("user-1", "install-abc", InteractionMode::Pin);
        let b = sample_device("user-1", "install-abc", InteractionMode::Pin);

        let (ra, rb) = tokio::join!(
            DeviceStore::create_device(&db, &a),
            DeviceStore::create_device(&db, &b),
        );
        let successes = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);

        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM devices WHERE user_id = ? AND device_id = ?")
                .bind("user-1")
                .bind("install-abc")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn update_password_leaves_identity_untouched() {
        let db = Database::new_in_memory().await;
        let device = sample_device("user-1", "install-abc", InteractionMode::Pin);
        DeviceStore::create_device(&db, &device).await.unwrap();

        DeviceStore::update_password(&db, &device.id, "$argon2id$rotated")
            .await
            .unwrap();

        let found = DeviceStore::find_device(&db, "user-1", "install-abc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.password_hash.as_deref(), Some("$argon2id$rotated"));
        assert_eq!(found.user_id, "user-1");
        assert_eq!(found.device_id, "install-abc");
        assert_eq!(found.interaction_mode(), InteractionMode::Pin);
        assert!(found.public_key.is_none());
    }

    #[tokio::test]
    async fn update_public_key_rotates_only_the_key() {
        let db = Database::new_in_memory().await;
        let device = sample_device("user-1", "install-xyz", InteractionMode::Fingerprint);
        DeviceStore::create_device(&db, &device).await.unwrap();

        DeviceStore::update_public_key(&db, &device.id, "bmV3LWtleQ")
            .await
            .unwrap();

        let found = DeviceStore::find_by_device_id(&db, "install-xyz")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.public_key.as_deref(), Some("bmV3LWtleQ"));
        assert_eq!(found.interaction_mode(), InteractionMode::Fingerprint);
        assert!(found.password_hash.is_none());
    }
}
