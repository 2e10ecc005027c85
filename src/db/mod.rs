//! Database persistence for positions and their entry chains.
//!
//! The entry chain is stored with an explicit `seq` column; load order is
//! chain order, which is what every calculation runs over. Decimals are
//! stored as TEXT and parsed back losslessly.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::{Direction, Entry, EntryKind, Position};

/// Database connection pool for position storage.
pub struct Database {
    pool: SqlitePool,
}

/// Stored position row.
#[derive(Debug, Clone, sqlx::FromRow)]
struct PositionRow {
    id: i64,
    symbol: String,
    direction: String,
    stop_loss: Option<String>,
    take_profit: Option<String>,
    created_at: String,
    updated_at: String,
}

/// Stored entry row.
#[derive(Debug, Clone, sqlx::FromRow)]
struct EntryRow {
    id: String,
    kind: String,
    price: String,
    size: String,
    leverage: String,
    stop_loss: Option<String>,
    take_profit: Option<String>,
    created_at: String,
}

impl Database {
    /// Create a new database connection.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run all database migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                direction TEXT NOT NULL,
                stop_loss TEXT,
                take_profit TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                position_id INTEGER NOT NULL REFERENCES positions(id) ON DELETE CASCADE,
                seq INTEGER NOT NULL,
                kind TEXT NOT NULL,
                price TEXT NOT NULL,
                size TEXT NOT NULL,
                leverage TEXT NOT NULL,
                stop_loss TEXT,
                take_profit TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(position_id, seq)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_position ON entries(position_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert a new position and its entry chain; returns the new id.
    pub async fn save_position(&self, position: &Position) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO positions (symbol, direction, stop_loss, take_profit, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&position.symbol)
        .bind(position.direction.as_str())
        .bind(position.stop_loss.map(|d| d.to_string()))
        .bind(position.take_profit.map(|d| d.to_string()))
        .bind(position.created_at.to_rfc3339())
        .bind(position.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to insert position")?;

        let id = result.last_insert_rowid();
        self.replace_entries(id, &position.entries).await?;

        Ok(id)
    }

    /// Persist the current state of an already-stored position.
    ///
    /// The whole chain is rewritten; edits and removals need no
    /// special-case queries that way.
    pub async fn update_position(&self, position: &Position) -> Result<()> {
        let id = position
            .id
            .ok_or_else(|| anyhow!("Position has not been saved yet"))?;

        let result = sqlx::query(
            r#"
            UPDATE positions SET
                stop_loss = ?,
                take_profit = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(position.stop_loss.map(|d| d.to_string()))
        .bind(position.take_profit.map(|d| d.to_string()))
        .bind(position.updated_at.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update position")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("No stored position with id {}", id);
        }

        self.replace_entries(id, &position.entries).await
    }

    async fn replace_entries(&self, position_id: i64, entries: &[Entry]) -> Result<()> {
        sqlx::query("DELETE FROM entries WHERE position_id = ?")
            .bind(position_id)
            .execute(&self.pool)
            .await?;

        for (seq, entry) in entries.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO entries
                    (id, position_id, seq, kind, price, size, leverage, stop_loss, take_profit, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(entry.id.to_string())
            .bind(position_id)
            .bind(seq as i64)
            .bind(entry.kind.as_str())
            .bind(entry.price.to_string())
            .bind(entry.size.to_string())
            .bind(entry.leverage.to_string())
            .bind(entry.stop_loss.map(|d| d.to_string()))
            .bind(entry.take_profit.map(|d| d.to_string()))
            .bind(entry.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Failed to insert entry")?;
        }

        Ok(())
    }

    /// Load a position with its entry chain in chain order.
    pub async fn get_position(&self, id: i64) -> Result<Position> {
        let row: PositionRow = sqlx::query_as("SELECT * FROM positions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| anyhow!("No stored position with id {}", id))?;

        let entry_rows: Vec<EntryRow> = sqlx::query_as(
            "SELECT id, kind, price, size, leverage, stop_loss, take_profit, created_at
             FROM entries WHERE position_id = ? ORDER BY seq",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let entries = entry_rows
            .into_iter()
            .map(entry_from_row)
            .collect::<Result<Vec<_>>>()?;

        position_from_row(row, entries)
    }

    /// Load every stored position.
    pub async fn list_positions(&self) -> Result<Vec<Position>> {
        let rows: Vec<PositionRow> = sqlx::query_as("SELECT * FROM positions ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut positions = Vec::with_capacity(rows.len());
        for row in rows {
            positions.push(self.get_position(row.id).await?);
        }

        Ok(positions)
    }

    /// Delete a position and its entries.
    pub async fn delete_position(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM entries WHERE position_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let result = sqlx::query("DELETE FROM positions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("No stored position with id {}", id);
        }

        Ok(())
    }
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s).with_context(|| format!("Invalid stored decimal: {}", s))
}

fn parse_optional_decimal(s: Option<&str>) -> Result<Option<Decimal>> {
    s.map(parse_decimal).transpose()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Invalid stored timestamp: {}", s))
}

fn entry_from_row(row: EntryRow) -> Result<Entry> {
    Ok(Entry {
        id: Uuid::parse_str(&row.id).with_context(|| format!("Invalid entry id: {}", row.id))?,
        kind: EntryKind::from_str(&row.kind)
            .ok_or_else(|| anyhow!("Unknown entry kind: {}", row.kind))?,
        price: parse_decimal(&row.price)?,
        size: parse_decimal(&row.size)?,
        leverage: parse_decimal(&row.leverage)?,
        stop_loss: parse_optional_decimal(row.stop_loss.as_deref())?,
        take_profit: parse_optional_decimal(row.take_profit.as_deref())?,
        created_at: parse_timestamp(&row.created_at)?,
    })
}

fn position_from_row(row: PositionRow, entries: Vec<Entry>) -> Result<Position> {
    Ok(Position {
        id: Some(row.id),
        symbol: row.symbol,
        direction: Direction::from_str(&row.direction)
            .ok_or_else(|| anyhow!("Unknown direction: {}", row.direction))?,
        entries,
        stop_loss: parse_optional_decimal(row.stop_loss.as_deref())?,
        take_profit: parse_optional_decimal(row.take_profit.as_deref())?,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn temp_db() -> Database {
        let path = std::env::temp_dir().join(format!("perpcalc-test-{}.db", Uuid::new_v4()));
        Database::new(&format!("sqlite:{}?mode=rwc", path.display()))
            .await
            .unwrap()
    }

    fn short_position() -> Position {
        let mut pos =
            Position::new("BTC", Direction::Short, dec!(102500), dec!(1500), dec!(7)).unwrap();
        pos.set_protections(Some(dec!(104500)), Some(dec!(90415)))
            .unwrap();
        pos
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let db = temp_db().await;
        let mut pos = short_position();
        pos.append(Entry::new(EntryKind::Add, dec!(96000), dec!(1500), dec!(7)))
            .unwrap();

        let id = db.save_position(&pos).await.unwrap();
        let loaded = db.get_position(id).await.unwrap();

        assert_eq!(loaded.id, Some(id));
        assert_eq!(loaded.symbol, "BTC");
        assert_eq!(loaded.direction, Direction::Short);
        assert_eq!(loaded.stop_loss, Some(dec!(104500)));
        assert_eq!(loaded.entries.len(), 2);
        assert_eq!(loaded.entries[0].kind, EntryKind::Initial);
        assert_eq!(loaded.entries[1].price, dec!(96000));
    }

    #[tokio::test]
    async fn test_update_rewrites_chain() {
        let db = temp_db().await;
        let pos = short_position();

        let id = db.save_position(&pos).await.unwrap();
        let mut loaded = db.get_position(id).await.unwrap();

        loaded
            .append(Entry::new(EntryKind::Subtract, dec!(100000), dec!(500), dec!(7)))
            .unwrap();
        db.update_position(&loaded).await.unwrap();

        let reloaded = db.get_position(id).await.unwrap();
        assert_eq!(reloaded.entries.len(), 2);
        assert_eq!(reloaded.entries[1].kind, EntryKind::Subtract);
    }

    #[tokio::test]
    async fn test_entries_load_in_chain_order() {
        let db = temp_db().await;
        let mut pos = short_position();
        for i in 1..=5u32 {
            pos.append(Entry::new(
                EntryKind::Add,
                dec!(96000) + Decimal::from(i),
                dec!(100),
                dec!(7),
            ))
            .unwrap();
        }

        let id = db.save_position(&pos).await.unwrap();
        let loaded = db.get_position(id).await.unwrap();

        let prices: Vec<Decimal> = loaded.entries.iter().skip(1).map(|e| e.price).collect();
        let mut sorted = prices.clone();
        sorted.sort();
        assert_eq!(prices, sorted);
    }

    #[tokio::test]
    async fn test_delete_position() {
        let db = temp_db().await;
        let id = db.save_position(&short_position()).await.unwrap();

        db.delete_position(id).await.unwrap();
        assert!(db.get_position(id).await.is_err());
        assert!(db.delete_position(id).await.is_err());
    }

    #[tokio::test]
    async fn test_list_positions() {
        let db = temp_db().await;
        assert!(db.list_positions().await.unwrap().is_empty());

        db.save_position(&short_position()).await.unwrap();
        db.save_position(&short_position()).await.unwrap();

        let all = db.list_positions().await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
