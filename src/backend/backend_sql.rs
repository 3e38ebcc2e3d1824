use std::path::{Path, PathBuf};

use sqlx::{migrate::MigrateDatabase, query_as, Pool, Sqlite, SqlitePool};

use log::{error, info};

use crate::backend::{CreateError, FindError};
use crate::user::{NewUser, User};

pub struct Backend(pub Pool<Sqlite>);

// sqlite's extended code for SQLITE_CONSTRAINT_UNIQUE
const UNIQUE_VIOLATION: &str = "2067";

fn into_sql(path: &Path) -> PathBuf {
    path.join("site.sql")
}

pub async fn init(data_dir: &Path) {
    let final_path = format!(
        "sqlite://{}",
        into_sql(data_dir).to_str().expect("non utf-8 data")
    );
    match Sqlite::create_database(&final_path).await {
        Ok(()) => {
            info!("Using {}", &final_path);
        }
        Err(e) => {
            let sqlx::Error::Database(db_err) = e else {
                panic!("error creating database: {e}");
            };

            panic!("sql db error: {db_err:?}");
        }
    }
}

impl Backend {
    pub async fn new(data_dir: &Path) -> Self {
        let db_pathbuf = into_sql(data_dir);
        let db_path = db_pathbuf.to_str().expect("non utf-8 data");
        let pool = match SqlitePool::connect(db_path).await {
            Ok(pool) => pool,
            Err(_err) => {
                init(data_dir).await;
                SqlitePool::connect(db_path).await.expect("db connection")
            }
        };

        Self::migrated(pool).await
    }

    pub async fn migrated(pool: Pool<Sqlite>) -> Self {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migration");

        Self(pool)
    }
}

impl Backend {
    pub async fn find_user(&self, username: &str) -> Result<User, FindError> {
        query_as::<_, User>(
            "
            SELECT id, username, pwhash, is_admin
            FROM users
            WHERE username = ?
            ",
        )
        .bind(username)
        .fetch_one(&self.0)
        .await
        .map_err(|e| {
            if matches!(e, sqlx::Error::RowNotFound) {
                FindError::NotFound
            } else {
                error!("couldn't find user \"{username}\": {e:?}");
                FindError::Internal
            }
        })
    }

    pub async fn users(&self) -> Result<Vec<User>, ()> {
        query_as::<_, User>(
            "
            SELECT id, username, pwhash, is_admin
            FROM users
            ORDER BY id
            ",
        )
        .fetch_all(&self.0)
        .await
        .map_err(|e| {
            error!("couldn't list users: {e:?}");
        })
    }

    /// The first user ever created is the admin. Deciding that inside the
    /// insert keeps two racing signups from both becoming admin.
    pub async fn create_user(&self, new_user: &NewUser) -> Result<User, CreateError> {
        query_as::<_, User>(
            "
            INSERT INTO users (username, pwhash, is_admin)
            SELECT ?, ?, NOT EXISTS (SELECT 1 FROM users)
            RETURNING id, username, pwhash, is_admin
            ",
        )
        .bind(new_user.username.as_str())
        .bind(new_user.pwhash.as_str())
        .fetch_one(&self.0)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err)
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                CreateError::Taken
            }
            e => {
                error!("couldn't create user \"{}\": {e:?}", new_user.username);
                CreateError::Internal
            }
        })
    }
}
