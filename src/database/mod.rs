use mongodb::bson::{doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};

use crate::models::{
    AttendanceRecord, Contact, Course, Employee, OfflineCourse, OfflineStudent, User, Video,
};

pub const USERS: &str = "users";
pub const COURSES: &str = "courses";
pub const VIDEOS: &str = "videos";
pub const CONTACTS: &str = "contacts";
pub const EMPLOYEES: &str = "employees";
pub const ATTENDANCE: &str = "attendance";
pub const OFFLINE_COURSES: &str = "offline_courses";
pub const OFFLINE_STUDENTS: &str = "offline_students";

#[derive(Clone)]
pub struct MongoDB {
    client: Client,
    db: Database,
}

impl MongoDB {
    pub async fn new(uri: &str) -> Result<Self, mongodb::error::Error> {
        let mut client_options = mongodb::options::ClientOptions::parse(uri).await?;

        client_options.max_pool_size = Some(20);
        client_options.min_pool_size = Some(5);
        client_options.max_idle_time = Some(std::time::Duration::from_secs(300));

        client_options.connect_timeout = Some(std::time::Duration::from_secs(5));
        client_options.server_selection_timeout = Some(std::time::Duration::from_secs(5));

        let client = Client::with_options(client_options)?;
        let mongodb = Self::from_client(client, database_name(uri));

        // Test connection
        mongodb.ping().await?;
        mongodb.ensure_indexes().await?;

        Ok(mongodb)
    }

    /// Wraps an existing client without touching the server.
    pub fn from_client(client: Client, db_name: &str) -> Self {
        let db = client.database(db_name);
        Self { client, db }
    }

    pub async fn ping(&self) -> Result<(), mongodb::error::Error> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    /// Creates necessary indexes for optimal query performance
    async fn ensure_indexes(&self) -> Result<(), mongodb::error::Error> {
        log::info!("🔧 Creating database indexes...");

        for (collection, keys, unique) in index_plan() {
            let description = format!("{}({:?})", collection, keys.keys().collect::<Vec<_>>());
            let index = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(unique).build())
                .build();

            match self.db.collection::<Document>(collection).create_index(index).await {
                Ok(_) => log::info!("   ✅ Index ready: {}", description),
                Err(e) if index_failure_is_fatal(unique) => {
                    log::error!("   ❌ Unique index {} could not be built: {}", description, e);
                    return Err(e);
                }
                Err(e) => log::warn!("   ⚠️  Index not created {}: {}", description, e),
            }
        }

        log::info!("✅ Database indexes ready");

        Ok(())
    }

    /// Opens a session with a running transaction. Callers commit or abort.
    pub async fn start_transaction(&self) -> Result<ClientSession, mongodb::error::Error> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;
        Ok(session)
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }

    pub fn users(&self) -> Collection<User> {
        self.collection(USERS)
    }

    pub fn courses(&self) -> Collection<Course> {
        self.collection(COURSES)
    }

    pub fn videos(&self) -> Collection<Video> {
        self.collection(VIDEOS)
    }

    pub fn contacts(&self) -> Collection<Contact> {
        self.collection(CONTACTS)
    }

    pub fn employees(&self) -> Collection<Employee> {
        self.collection(EMPLOYEES)
    }

    pub fn attendance(&self) -> Collection<AttendanceRecord> {
        self.collection(ATTENDANCE)
    }

    pub fn offline_courses(&self) -> Collection<OfflineCourse> {
        self.collection(OFFLINE_COURSES)
    }

    pub fn offline_students(&self) -> Collection<OfflineStudent> {
        self.collection(OFFLINE_STUDENTS)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

/// Extract database name from URI or use default
fn database_name(uri: &str) -> &str {
    uri.split_once("://")
        .and_then(|(_, rest)| rest.split_once('/'))
        .and_then(|(_, path)| path.split('?').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("elearning")
}

/// Indexes created at startup as `(collection, keys, unique)`.
fn index_plan() -> Vec<(&'static str, Document, bool)> {
    vec![
        (USERS, doc! { "email": 1 }, true),
        (USERS, doc! { "role": 1 }, false),
        (USERS, doc! { "instructor_profile.approval.status": 1 }, false),
        (COURSES, doc! { "instructor_id": 1 }, false),
        (COURSES, doc! { "is_approved.status": 1 }, false),
        (VIDEOS, doc! { "course_id": 1 }, false),
        (VIDEOS, doc! { "is_approved.status": 1 }, false),
        (ATTENDANCE, doc! { "employee_id": 1, "date": 1 }, true),
        (OFFLINE_STUDENTS, doc! { "course_id": 1, "email": 1 }, true),
        (CONTACTS, doc! { "created_at": -1 }, false),
    ]
}

/// Unique index failures abort startup; the rest only degrade query speed.
fn index_failure_is_fatal(unique: bool) -> bool {
    unique
}

/// True when a write failed on a unique index.
pub fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        _ => false,
    }
}

/// Commits `session` when `result` is Ok, aborts it otherwise.
pub async fn finish_transaction<T, E>(
    session: &mut ClientSession,
    result: Result<T, E>,
) -> Result<T, E>
where
    E: From<mongodb::error::Error>,
{
    match result {
        Ok(value) => {
            session.commit_transaction().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(abort_error) = session.abort_transaction().await {
                log::warn!("⚠️ Failed to abort transaction: {}", abort_error);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_name_comes_from_uri_path() {
        assert_eq!(database_name("mongodb://localhost:27017/academy"), "academy");
        assert_eq!(
            database_name("mongodb+srv://u:p@cluster.example.net/academy?retryWrites=true"),
            "academy"
        );
    }

    #[test]
    fn database_name_falls_back_to_default() {
        assert_eq!(database_name("mongodb://localhost:27017"), "elearning");
        assert_eq!(database_name("mongodb://localhost:27017/"), "elearning");
        assert_eq!(database_name("mongodb://localhost/?replicaSet=rs0"), "elearning");
    }

    fn is_unique(plan: &[(&str, Document, bool)], collection: &str, keys: Document) -> bool {
        plan.iter()
            .any(|(name, index_keys, unique)| *name == collection && *index_keys == keys && *unique)
    }

    #[test]
    fn duplicate_guards_are_backed_by_unique_indexes() {
        let plan = index_plan();
        assert!(is_unique(&plan, USERS, doc! { "email": 1 }));
        assert!(is_unique(&plan, OFFLINE_STUDENTS, doc! { "course_id": 1, "email": 1 }));
        assert!(is_unique(&plan, ATTENDANCE, doc! { "employee_id": 1, "date": 1 }));
    }

    #[test]
    fn only_unique_index_failures_stop_startup() {
        assert!(index_failure_is_fatal(true));
        assert!(!index_failure_is_fatal(false));
        for (_, _, unique) in index_plan() {
            assert_eq!(index_failure_is_fatal(unique), unique);
        }
    }
}
