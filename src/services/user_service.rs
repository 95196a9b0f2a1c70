use crate::error::Result;
use crate::models::user::{SearchLocation, UserProfile};
use sqlx::{Row, SqlitePool};

const DEFAULT_LOCATIONS: [(&str, &str, i64); 3] = [
    ("Indianapolis", "IN", 30),
    ("West Lafayette", "IN", 25),
    ("Plainfield", "IN", 20),
];

#[derive(Clone)]
pub struct UserService {
    pool: SqlitePool,
}

impl UserService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// First login creates the profile and seeds the default search
    /// locations; later logins just return the existing row.
    pub async fn get_or_create(&self, username: &str) -> Result<UserProfile> {
        if let Some(user) = self.get_by_username(username).await? {
            return Ok(user);
        }

        let result = sqlx::query("INSERT INTO users (username) VALUES (?1)")
            .bind(username)
            .execute(&self.pool)
            .await?;
        let user_id = result.last_insert_rowid();

        for (city, state, radius) in DEFAULT_LOCATIONS {
            sqlx::query(
                r#"
                INSERT INTO search_locations (user_id, city, state, label, radius_miles, active)
                VALUES (?1, ?2, ?3, ?4, ?5, 1)
                "#,
            )
            .bind(user_id)
            .bind(city)
            .bind(state)
            .bind(format!("{}, {}", city, state))
            .bind(radius)
            .execute(&self.pool)
            .await?;
        }

        tracing::info!(username, user_id, "created user profile with default locations");
        self.get_by_id(user_id).await
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<UserProfile>> {
        let user = sqlx::query_as::<_, UserProfile>(
            "SELECT id, username, resume_text, resume_name, ai_context, created_at FROM users WHERE username = ?1 COLLATE NOCASE",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<UserProfile> {
        let user = sqlx::query_as::<_, UserProfile>(
            "SELECT id, username, resume_text, resume_name, ai_context, created_at FROM users WHERE id = ?1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn update_resume(&self, id: i64, resume_text: &str, resume_name: &str) -> Result<()> {
        sqlx::query("UPDATE users SET resume_text = ?1, resume_name = ?2 WHERE id = ?3")
            .bind(resume_text)
            .bind(resume_name)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_context(&self, id: i64, ai_context: &str) -> Result<()> {
        sqlx::query("UPDATE users SET ai_context = ?1 WHERE id = ?2")
            .bind(ai_context)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_locations(&self, user_id: i64) -> Result<Vec<SearchLocation>> {
        let rows = sqlx::query_as::<_, SearchLocation>(
            "SELECT id, user_id, city, state, label, radius_miles, active FROM search_locations WHERE user_id = ?1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn active_locations(&self, user_id: i64) -> Result<Vec<SearchLocation>> {
        let rows = sqlx::query_as::<_, SearchLocation>(
            "SELECT id, user_id, city, state, label, radius_miles, active FROM search_locations WHERE user_id = ?1 AND active = 1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn add_location(
        &self,
        user_id: i64,
        city: &str,
        state: &str,
        label: &str,
        radius_miles: i64,
        active: bool,
    ) -> Result<SearchLocation> {
        let label = if label.is_empty() {
            if state.is_empty() {
                city.to_string()
            } else {
                format!("{}, {}", city, state)
            }
        } else {
            label.to_string()
        };
        let result = sqlx::query(
            r#"
            INSERT INTO search_locations (user_id, city, state, label, radius_miles, active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(user_id)
        .bind(city)
        .bind(state)
        .bind(&label)
        .bind(radius_miles)
        .bind(active)
        .execute(&self.pool)
        .await?;
        let id = result.last_insert_rowid();
        let row = sqlx::query_as::<_, SearchLocation>(
            "SELECT id, user_id, city, state, label, radius_miles, active FROM search_locations WHERE id = ?1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn delete_location(&self, user_id: i64, location_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM search_locations WHERE id = ?1 AND user_id = ?2")
            .bind(location_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(crate::error::Error::NotFound("Location not found".into()));
        }
        Ok(())
    }

    pub async fn count_users(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as c FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("c"))
    }
}
