use sqlx::{migrate::MigrateDatabase, sqlite::{SqlitePool, SqlitePoolOptions}, Sqlite, Row};
use std::env;
use log::info;

use crate::error::{Error, Result};
use crate::models::{Lga, NewPollingUnit, PartyRoster, PollingUnit, Ward, STATE_ID};

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new() -> Result<Self> {
        // Get database URL from environment or use a default
        let db_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:delta_tally.db".to_string());

        // Create database if it doesn't exist
        if !Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            Sqlite::create_database(&db_url).await.map_err(Error::Query)?;
        }

        // Connect to the database
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(Error::Query)?;

        // Initialize schema
        Self::init_schema(&pool).await?;

        info!("connected to {}", db_url);
        Ok(Self { pool })
    }

    /// In-memory database on a single pinned connection. An in-memory SQLite
    /// vanishes with its connection, so the pool must never reap it.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(Error::Query)?;

        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    // Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // Initialize the database schema
    async fn init_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS polling_unit (
                uniqueid INTEGER PRIMARY KEY,
                polling_unit_name TEXT NOT NULL,
                ward_id INTEGER NOT NULL,
                lga_id INTEGER NOT NULL,
                state_id INTEGER NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await
        .map_err(Error::Query)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS announced_pu_results (
                result_id INTEGER PRIMARY KEY AUTOINCREMENT,
                polling_unit_uniqueid INTEGER NOT NULL,
                party_abbreviation TEXT NOT NULL,
                party_score INTEGER NOT NULL CHECK (party_score >= 0)
            );
            "#,
        )
        .execute(pool)
        .await
        .map_err(Error::Query)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS announced_lga_results (
                result_id INTEGER PRIMARY KEY AUTOINCREMENT,
                lga_id INTEGER NOT NULL,
                party_abbreviation TEXT NOT NULL,
                party_score INTEGER NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await
        .map_err(Error::Query)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS lga (
                lga_id INTEGER PRIMARY KEY,
                lga_name TEXT NOT NULL,
                state_id INTEGER NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await
        .map_err(Error::Query)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ward (
                ward_id INTEGER PRIMARY KEY,
                ward_name TEXT NOT NULL,
                lga_id INTEGER NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await
        .map_err(Error::Query)?;

        Ok(())
    }

    // Get a polling unit by its uniqueid
    pub async fn get_polling_unit(&self, pu_id: i64) -> Result<Option<PollingUnit>> {
        let row = sqlx::query(
            r#"
            SELECT uniqueid, polling_unit_name, ward_id, lga_id, state_id
            FROM polling_unit
            WHERE uniqueid = ?
            "#,
        )
        .bind(pu_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Query)?;

        Ok(row.map(|row| PollingUnit {
            uniqueid: row.get::<i64, _>("uniqueid"),
            name: row.get::<String, _>("polling_unit_name"),
            ward_id: row.get::<i64, _>("ward_id"),
            lga_id: row.get::<i64, _>("lga_id"),
            state_id: row.get::<i64, _>("state_id"),
        }))
    }

    // Get announced per-party scores for one polling unit
    pub async fn pu_results(&self, pu_id: i64) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT party_abbreviation, party_score
            FROM announced_pu_results
            WHERE polling_unit_uniqueid = ?
            ORDER BY party_abbreviation
            "#,
        )
        .bind(pu_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Query)?
        .into_iter()
        .map(|row| {
            (
                row.get::<String, _>("party_abbreviation"),
                row.get::<i64, _>("party_score"),
            )
        })
        .collect();

        Ok(rows)
    }

    // List LGAs of the supported state, for lookups and form population
    pub async fn list_lgas(&self) -> Result<Vec<Lga>> {
        let lgas = sqlx::query(
            r#"
            SELECT lga_id, lga_name
            FROM lga
            WHERE state_id = ?
            ORDER BY lga_name
            "#,
        )
        .bind(STATE_ID)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Query)?
        .into_iter()
        .map(|row| Lga {
            lga_id: row.get::<i64, _>("lga_id"),
            lga_name: row.get::<String, _>("lga_name"),
        })
        .collect();

        Ok(lgas)
    }

    // List wards belonging to an LGA
    pub async fn list_wards(&self, lga_id: i64) -> Result<Vec<Ward>> {
        let wards = sqlx::query(
            r#"
            SELECT ward_id, ward_name
            FROM ward
            WHERE lga_id = ?
            ORDER BY ward_name
            "#,
        )
        .bind(lga_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Query)?
        .into_iter()
        .map(|row| Ward {
            ward_id: row.get::<i64, _>("ward_id"),
            ward_name: row.get::<String, _>("ward_name"),
        })
        .collect();

        Ok(wards)
    }

    // Sum PU-level scores per party across every polling unit in an LGA
    pub async fn sum_pu_results_by_party(&self, lga_id: i64) -> Result<Vec<(String, i64)>> {
        let sums = sqlx::query(
            r#"
            SELECT apr.party_abbreviation, SUM(apr.party_score) AS total_score
            FROM announced_pu_results apr
            JOIN polling_unit pu ON apr.polling_unit_uniqueid = pu.uniqueid
            WHERE pu.lga_id = ?
            GROUP BY apr.party_abbreviation
            "#,
        )
        .bind(lga_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Query)?
        .into_iter()
        .map(|row| {
            (
                row.get::<String, _>("party_abbreviation"),
                row.get::<i64, _>("total_score"),
            )
        })
        .collect();

        Ok(sums)
    }

    // Officially announced per-party totals for an LGA
    pub async fn list_lga_results(&self, lga_id: i64) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT party_abbreviation, party_score
            FROM announced_lga_results
            WHERE lga_id = ?
            "#,
        )
        .bind(lga_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Query)?
        .into_iter()
        .map(|row| {
            (
                row.get::<String, _>("party_abbreviation"),
                row.get::<i64, _>("party_score"),
            )
        })
        .collect();

        Ok(rows)
    }

    // Highest committed polling unit id, 0 when none exist
    pub async fn max_pu_id(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COALESCE(MAX(uniqueid), 0) AS max_id FROM polling_unit")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Query)?;

        Ok(row.get::<i64, _>("max_id"))
    }

    /// Creates a polling unit together with one result row per tracked party,
    /// as a single transaction.
    ///
    /// The new id is `max(uniqueid) + 1`, read inside the same transaction as
    /// the inserts so concurrent submissions cannot both commit it. Parties
    /// absent from the submitted scores are recorded as 0. If any insert
    /// fails the whole scope rolls back and no trace of the attempt remains.
    pub async fn create_polling_unit(
        &self,
        roster: &PartyRoster,
        new_pu: &NewPollingUnit,
    ) -> Result<i64> {
        let (lga_id, ward_id, name) = new_pu.validate()?;

        let mut tx = self.pool.begin().await.map_err(Error::Transaction)?;

        let row = sqlx::query("SELECT COALESCE(MAX(uniqueid), 0) AS max_id FROM polling_unit")
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::Transaction)?;
        let new_id = row.get::<i64, _>("max_id") + 1;

        sqlx::query(
            r#"
            INSERT INTO polling_unit (uniqueid, polling_unit_name, ward_id, lga_id, state_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(new_id)
        .bind(name)
        .bind(ward_id)
        .bind(lga_id)
        .bind(STATE_ID)
        .execute(&mut *tx)
        .await
        .map_err(Error::Transaction)?;

        // One row per tracked party; dropping the transaction on an early
        // return rolls everything back, including the polling_unit row.
        for party in roster.iter() {
            let score = new_pu.scores.get(party).copied().unwrap_or(0);
            sqlx::query(
                r#"
                INSERT INTO announced_pu_results (polling_unit_uniqueid, party_abbreviation, party_score)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(new_id)
            .bind(party)
            .bind(score)
            .execute(&mut *tx)
            .await
            .map_err(Error::Transaction)?;
        }

        tx.commit().await.map_err(Error::Transaction)?;

        info!("created polling unit {} ({})", new_id, name);
        Ok(new_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    async fn seed_reference_data(db: &Database) {
        sqlx::query("INSERT INTO lga (lga_id, lga_name, state_id) VALUES (3, 'Aniocha North', ?)")
            .bind(STATE_ID)
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO ward (ward_id, ward_name, lga_id) VALUES (7, 'Ward 7', 3)")
            .execute(db.pool())
            .await
            .unwrap();
    }

    fn submission(scores: &[(&str, i64)]) -> NewPollingUnit {
        NewPollingUnit {
            lga_id: Some(3),
            ward_id: Some(7),
            name: "Unit A".to_string(),
            scores: scores
                .iter()
                .map(|(p, s)| (p.to_string(), *s))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[tokio::test]
    async fn create_allocates_max_plus_one_and_writes_full_roster() {
        let db = Database::in_memory().await.unwrap();
        let roster = PartyRoster::default();
        seed_reference_data(&db).await;

        // Pre-existing polling unit with a high id
        sqlx::query(
            "INSERT INTO polling_unit (uniqueid, polling_unit_name, ward_id, lga_id, state_id)
             VALUES (10, 'Unit Zero', 7, 3, ?)",
        )
        .bind(STATE_ID)
        .execute(db.pool())
        .await
        .unwrap();

        let new_id = db
            .create_polling_unit(&roster, &submission(&[("PDP", 50), ("ACN", 30)]))
            .await
            .unwrap();
        assert_eq!(new_id, 11);

        let pu = db.get_polling_unit(11).await.unwrap().unwrap();
        assert_eq!(pu.name, "Unit A");
        assert_eq!(pu.ward_id, 7);
        assert_eq!(pu.lga_id, 3);
        assert_eq!(pu.state_id, STATE_ID);

        let results = db.pu_results(11).await.unwrap();
        assert_eq!(results.len(), 9);
        let by_party: HashMap<_, _> = results.into_iter().collect();
        assert_eq!(by_party["PDP"], 50);
        assert_eq!(by_party["ACN"], 30);
        assert_eq!(by_party["ACCORD"], 0);
        assert_eq!(by_party["CPC"], 0);
    }

    #[tokio::test]
    async fn create_on_empty_store_allocates_id_one() {
        let db = Database::in_memory().await.unwrap();
        // Substituted two-party roster, per-construction injection
        let roster = PartyRoster::new(vec!["PDP".to_string(), "ACN".to_string()]);
        seed_reference_data(&db).await;

        let new_id = db
            .create_polling_unit(&roster, &submission(&[]))
            .await
            .unwrap();
        assert_eq!(new_id, 1);
        assert_eq!(db.pu_results(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn validation_failure_writes_nothing() {
        let db = Database::in_memory().await.unwrap();
        let roster = PartyRoster::default();

        let mut incomplete = submission(&[("PDP", 12)]);
        incomplete.name = String::new();

        let err = db
            .create_polling_unit(&roster, &incomplete)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation("pu_name")));
        assert_eq!(db.max_pu_id().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_result_insert_rolls_back_the_polling_unit() {
        let db = Database::in_memory().await.unwrap();
        let roster = PartyRoster::default();
        seed_reference_data(&db).await;

        // A negative score violates the check constraint partway through the
        // per-party inserts (roster order puts PDP first, CPC seventh).
        let err = db
            .create_polling_unit(&roster, &submission(&[("PDP", 40), ("CPC", -1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transaction(_)));

        // The attempted id 1 must not be visible afterwards
        assert_eq!(db.max_pu_id().await.unwrap(), 0);
        assert!(db.get_polling_unit(1).await.unwrap().is_none());
        assert!(db.pu_results(1).await.unwrap().is_empty());

        // A later submission reuses the id the failed attempt did not commit
        let new_id = db
            .create_polling_unit(&roster, &submission(&[("PDP", 40)]))
            .await
            .unwrap();
        assert_eq!(new_id, 1);
    }

    #[tokio::test]
    async fn concurrent_creates_never_share_an_id() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let roster = PartyRoster::default();
        seed_reference_data(db.as_ref()).await;

        let a = tokio::spawn({
            let db = Arc::clone(&db);
            let roster = roster.clone();
            async move { db.create_polling_unit(&roster, &submission(&[("PDP", 1)])).await }
        });
        let b = tokio::spawn({
            let db = Arc::clone(&db);
            let roster = roster.clone();
            async move { db.create_polling_unit(&roster, &submission(&[("ACN", 2)])).await }
        });

        let id_a = a.await.unwrap().unwrap();
        let id_b = b.await.unwrap().unwrap();
        assert_ne!(id_a, id_b);
        assert_eq!(id_a.max(id_b), 2);
        assert_eq!(db.max_pu_id().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn sum_groups_pu_scores_by_party_within_the_lga() {
        let db = Database::in_memory().await.unwrap();
        let roster = PartyRoster::default();
        seed_reference_data(&db).await;

        db.create_polling_unit(&roster, &submission(&[("PDP", 100), ("ACN", 20)]))
            .await
            .unwrap();
        db.create_polling_unit(&roster, &submission(&[("PDP", 200)]))
            .await
            .unwrap();

        // Polling unit in a different LGA must not contribute
        let mut other = submission(&[("PDP", 999)]);
        other.lga_id = Some(4);
        db.create_polling_unit(&roster, &other).await.unwrap();

        let sums: HashMap<_, _> = db
            .sum_pu_results_by_party(3)
            .await
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(sums["PDP"], 300);
        assert_eq!(sums["ACN"], 20);
        assert_eq!(sums["ACCORD"], 0);
    }
}
