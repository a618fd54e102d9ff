use super::model::NewModule;
use crate::model::{Module, ModuleDraft, ModuleStatus};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the
/// parent directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Trivial liveness probe used by the batch pre-flight.
pub async fn ping(pool: &Pool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

fn module_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Module> {
    let status_str: String = row.get("status");
    let status = ModuleStatus::parse_status(&status_str)
        .ok_or_else(|| anyhow!("module has unknown status {}", status_str))?;
    let tags_json: String = row.get("tags");
    let tags: Vec<String> =
        serde_json::from_str(&tags_json).context("module tags column is not a JSON array")?;
    let enrichment: Option<serde_json::Value> = row
        .try_get::<Option<String>, _>("enrichment")
        .ok()
        .flatten()
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .context("module enrichment column is not valid JSON")?;

    Ok(Module {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        category: row.get("category"),
        tags,
        summary: row.try_get::<Option<String>, _>("summary").ok().flatten(),
        body: row.get("body"),
        enrichment,
        status,
        mirror_id: row
            .try_get::<Option<String>, _>("mirror_id")
            .ok()
            .flatten()
            .filter(|s| !s.trim().is_empty()),
        updated_at: row.get("updated_at"),
        created_at: row.get("created_at"),
    })
}

#[instrument(skip_all)]
pub async fn get_module_by_slug(pool: &Pool, slug: &str) -> Result<Option<Module>> {
    let row = sqlx::query("SELECT * FROM modules WHERE slug = ?")
        .bind(slug)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(module_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn find_slug_by_mirror_id(pool: &Pool, mirror_id: &str) -> Result<Option<String>> {
    let slug = sqlx::query_scalar::<_, String>("SELECT slug FROM modules WHERE mirror_id = ?")
        .bind(mirror_id)
        .fetch_optional(pool)
        .await?;
    Ok(slug)
}

/// Slugs of all published modules; the primary side of a full-catalog
/// candidate set. Drafts and archived modules never push.
#[instrument(skip_all)]
pub async fn list_published_slugs(pool: &Pool) -> Result<Vec<String>> {
    let slugs = sqlx::query_scalar::<_, String>(
        "SELECT slug FROM modules WHERE status = 'published' ORDER BY slug",
    )
    .fetch_all(pool)
    .await?;
    Ok(slugs)
}

#[instrument(skip_all, fields(slug = %module.slug))]
pub async fn insert_module(pool: &Pool, module: &NewModule) -> Result<i64> {
    let tags_json = serde_json::to_string(&module.tags)?;
    let enrichment_json = module
        .enrichment
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let rec = sqlx::query(
        "INSERT INTO modules (slug, title, category, tags, summary, body, enrichment, status, updated_at, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&module.slug)
    .bind(&module.title)
    .bind(&module.category)
    .bind(tags_json)
    .bind(&module.summary)
    .bind(&module.body)
    .bind(enrichment_json)
    .bind(module.status.as_str())
    .bind(Utc::now())
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(rec.get::<i64, _>("id"))
}

/// Create a primary record from pulled mirror content. Status starts as
/// `draft`, since pulled content has not passed this system's publish gate.
/// `updated_at` is set to the mirror's timestamp so the next pass resolves
/// to no action.
#[instrument(skip_all, fields(slug = %draft.slug))]
pub async fn create_pulled_module(
    pool: &Pool,
    draft: &ModuleDraft,
    mirror_id: &str,
    mirror_updated_at: DateTime<Utc>,
) -> Result<i64> {
    let tags_json = serde_json::to_string(&draft.tags)?;
    let rec = sqlx::query(
        "INSERT INTO modules (slug, title, category, tags, summary, body, status, mirror_id, updated_at, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&draft.slug)
    .bind(&draft.title)
    .bind(&draft.category)
    .bind(tags_json)
    .bind(&draft.summary)
    .bind(&draft.body)
    .bind(ModuleStatus::Draft.as_str())
    .bind(mirror_id)
    .bind(mirror_updated_at)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(rec.get::<i64, _>("id"))
}

/// Update an existing primary record from pulled mirror content. Only the
/// mapped content fields change; `status` and `enrichment` stay untouched.
#[instrument(skip_all, fields(slug = %draft.slug))]
pub async fn update_pulled_module(
    pool: &Pool,
    draft: &ModuleDraft,
    mirror_id: &str,
    mirror_updated_at: DateTime<Utc>,
) -> Result<()> {
    let tags_json = serde_json::to_string(&draft.tags)?;
    let affected = sqlx::query(
        "UPDATE modules SET title = ?, category = ?, tags = ?, summary = ?, body = ?, mirror_id = ?, updated_at = ? \
         WHERE slug = ?",
    )
    .bind(&draft.title)
    .bind(&draft.category)
    .bind(tags_json)
    .bind(&draft.summary)
    .bind(&draft.body)
    .bind(mirror_id)
    .bind(mirror_updated_at)
    .bind(&draft.slug)
    .execute(pool)
    .await?
    .rows_affected();
    if affected == 0 {
        return Err(anyhow!("module {} not found for pull update", draft.slug));
    }
    Ok(())
}

pub async fn set_mirror_id(pool: &Pool, slug: &str, mirror_id: &str) -> Result<()> {
    sqlx::query("UPDATE modules SET mirror_id = ? WHERE slug = ?")
        .bind(mirror_id)
        .bind(slug)
        .execute(pool)
        .await
        .context("failed to persist module mirror id")?;
    Ok(())
}

/// Clear the mirror linkage. Only the explicit deletion flow calls this.
pub async fn clear_mirror_id(pool: &Pool, slug: &str) -> Result<()> {
    sqlx::query("UPDATE modules SET mirror_id = NULL WHERE slug = ?")
        .bind(slug)
        .execute(pool)
        .await
        .context("failed to clear module mirror id")?;
    Ok(())
}

/// Re-stamp a module after a successful push so its timestamp lands inside
/// the tolerance window of the mirror's own write time. Guarded by the
/// timestamp the pass acted on: if an edit landed while the push was in
/// flight, the row keeps its newer timestamp and the returned `false` tells
/// the caller the next pass will re-sync it.
pub async fn align_updated_at(
    pool: &Pool,
    slug: &str,
    seen: DateTime<Utc>,
    at: DateTime<Utc>,
) -> Result<bool> {
    let affected = sqlx::query("UPDATE modules SET updated_at = ? WHERE slug = ? AND updated_at = ?")
        .bind(at)
        .bind(slug)
        .bind(seen)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(affected > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn sample_module(slug: &str, status: ModuleStatus) -> NewModule {
        NewModule {
            slug: slug.into(),
            title: format!("Title {}", slug),
            category: "guides".into(),
            tags: vec!["rust".into(), "sync".into()],
            summary: Some("summary".into()),
            body: "# Body".into(),
            enrichment: Some(serde_json::json!({"score": 0.9})),
            status,
        }
    }

    #[tokio::test]
    async fn insert_and_fetch_round_trip() {
        let pool = setup_pool().await;
        insert_module(&pool, &sample_module("intro", ModuleStatus::Published))
            .await
            .unwrap();

        let module = get_module_by_slug(&pool, "intro").await.unwrap().unwrap();
        assert_eq!(module.slug, "intro");
        assert_eq!(module.tags, vec!["rust".to_string(), "sync".to_string()]);
        assert_eq!(module.status, ModuleStatus::Published);
        assert_eq!(module.enrichment.unwrap()["score"], 0.9);
        assert!(module.mirror_id.is_none());

        assert!(get_module_by_slug(&pool, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn published_filter_excludes_drafts() {
        let pool = setup_pool().await;
        insert_module(&pool, &sample_module("a", ModuleStatus::Published))
            .await
            .unwrap();
        insert_module(&pool, &sample_module("b", ModuleStatus::Draft))
            .await
            .unwrap();
        insert_module(&pool, &sample_module("c", ModuleStatus::Archived))
            .await
            .unwrap();

        let slugs = list_published_slugs(&pool).await.unwrap();
        assert_eq!(slugs, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn mirror_id_lifecycle() {
        let pool = setup_pool().await;
        insert_module(&pool, &sample_module("intro", ModuleStatus::Published))
            .await
            .unwrap();

        set_mirror_id(&pool, "intro", "item-7").await.unwrap();
        assert_eq!(
            find_slug_by_mirror_id(&pool, "item-7").await.unwrap(),
            Some("intro".to_string())
        );
        let module = get_module_by_slug(&pool, "intro").await.unwrap().unwrap();
        assert_eq!(module.mirror_id.as_deref(), Some("item-7"));

        clear_mirror_id(&pool, "intro").await.unwrap();
        assert!(find_slug_by_mirror_id(&pool, "item-7")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn pulled_create_starts_as_draft() {
        let pool = setup_pool().await;
        let draft = ModuleDraft {
            slug: "from-mirror".into(),
            title: "From Mirror".into(),
            category: "guides".into(),
            tags: vec!["rust".into()],
            summary: None,
            body: "body".into(),
        };
        let at = Utc::now();
        create_pulled_module(&pool, &draft, "item-9", at).await.unwrap();

        let module = get_module_by_slug(&pool, "from-mirror")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(module.status, ModuleStatus::Draft);
        assert_eq!(module.mirror_id.as_deref(), Some("item-9"));
        assert_eq!(module.updated_at, at);
    }

    #[tokio::test]
    async fn pulled_update_preserves_status_and_enrichment() {
        let pool = setup_pool().await;
        insert_module(&pool, &sample_module("intro", ModuleStatus::Published))
            .await
            .unwrap();

        let draft = ModuleDraft {
            slug: "intro".into(),
            title: "Edited In Mirror".into(),
            category: "reference".into(),
            tags: vec!["cms".into()],
            summary: Some("new summary".into()),
            body: "new body".into(),
        };
        update_pulled_module(&pool, &draft, "item-1", Utc::now())
            .await
            .unwrap();

        let module = get_module_by_slug(&pool, "intro").await.unwrap().unwrap();
        assert_eq!(module.title, "Edited In Mirror");
        assert_eq!(module.status, ModuleStatus::Published);
        assert!(module.enrichment.is_some());
        assert_eq!(module.mirror_id.as_deref(), Some("item-1"));
    }

    #[tokio::test]
    async fn pulled_update_missing_slug_fails() {
        let pool = setup_pool().await;
        let draft = ModuleDraft {
            slug: "nope".into(),
            title: "t".into(),
            category: "c".into(),
            tags: vec![],
            summary: None,
            body: "b".into(),
        };
        assert!(update_pulled_module(&pool, &draft, "item-1", Utc::now())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn align_updated_at_skips_rows_edited_since_snapshot() {
        let pool = setup_pool().await;
        insert_module(&pool, &sample_module("intro", ModuleStatus::Published))
            .await
            .unwrap();
        let seen = get_module_by_slug(&pool, "intro")
            .await
            .unwrap()
            .unwrap()
            .updated_at;

        // Unchanged row: the re-stamp applies.
        let later = seen + chrono::Duration::seconds(30);
        assert!(align_updated_at(&pool, "intro", seen, later).await.unwrap());
        let module = get_module_by_slug(&pool, "intro").await.unwrap().unwrap();
        assert_eq!(module.updated_at, later);

        // Stale snapshot: a concurrent edit bumped the timestamp, so the
        // re-stamp must leave it alone.
        let even_later = later + chrono::Duration::seconds(30);
        assert!(!align_updated_at(&pool, "intro", seen, even_later)
            .await
            .unwrap());
        let module = get_module_by_slug(&pool, "intro").await.unwrap().unwrap();
        assert_eq!(module.updated_at, later);
    }

    #[test]
    fn prepare_sqlite_url_passthrough() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(prepare_sqlite_url("postgres://x"), "postgres://x");
    }
}
