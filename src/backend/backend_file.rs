use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use tokio::sync::Mutex;

use crate::backend::{CreateError, FindError};
use crate::user::{NewUser, User};

mod kv;
use kv::KeyValues;

pub struct Backend {
    root: PathBuf,
    // held across the "is anyone here yet?" scan and the write
    create: Mutex<()>,
}

impl Backend {
    pub async fn new(data_dir: &Path) -> Self {
        info!("Using {}", data_dir.join("users").display());

        Self {
            root: data_dir.to_path_buf(),
            create: Mutex::new(()),
        }
    }
}

macro_rules! path {
    ($root: expr, $($components: expr),*) => {
        {
            let mut p = $root.clone();
            path!(@internal, p, $($components),*);
            p
        }
    };
    (@internal, $p:expr, $next:expr, $($rest: expr),*) => {
        $p.push($next);
        path!(@internal, $p, $($rest),*);
    };
    (@internal, $p:expr, $next:expr) => {
        $p.push($next);
    };
}

const CREDS: &str = "creds.txt";
const KEYS: &[&str] = &["id", "pwhash", "admin"];

impl Backend {
    fn users_dir(&self) -> PathBuf {
        path!(self.root, "users")
    }

    fn user_dir(&self, username: &str) -> Result<PathBuf, FindError> {
        let plain = !username.is_empty()
            && !username.starts_with('.')
            && !username.contains(['/', '\\']);

        if !plain {
            warn!("refusing to look up {username:?} on disk");
            return Err(FindError::NotFound);
        }

        Ok(path!(self.root, "users", username))
    }

    fn read(&self, path: PathBuf) -> Result<KeyValues, FindError> {
        let file = File::open(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                return FindError::NotFound;
            }
            error!("open \"{path:?}\": {e:?}");
            FindError::Internal
        })?;

        kv::read(file, KEYS)
    }

    fn write(&self, path: PathBuf, keyvalues: &KeyValues) -> Result<(), std::io::Error> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;

        kv::write(file, keyvalues)
    }

    fn read_user(&self, username: &str) -> Result<User, FindError> {
        let dir = self.user_dir(username)?;
        let creds = self.read(path!(dir, CREDS))?;

        let field = |key: &str| creds.get(key).ok_or(FindError::Internal);

        let id = field("id")?.parse().map_err(|e| {
            error!("bad id for \"{username}\": {e:?}");
            FindError::Internal
        })?;
        let is_admin = match &field("admin")?[..] {
            "1" => true,
            "0" => false,
            other => {
                error!("bad admin flag for \"{username}\": {other:?}");
                return Err(FindError::Internal);
            }
        };

        Ok(User {
            id,
            username: username.into(),
            pwhash: field("pwhash")?.clone(),
            is_admin,
        })
    }

    fn all_users(&self) -> Result<Vec<User>, FindError> {
        let path = self.users_dir();

        let emap = |e: &dyn std::fmt::Debug| {
            error!("error listing users: {e:?}");
            FindError::Internal
        };

        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(emap(&e)),
        };

        let mut users = vec![];
        for ent in entries {
            let ent = ent.map_err(|e| emap(&e))?;

            if !ent.file_type().map_err(|e| emap(&e))?.is_dir() {
                warn!("ignoring stray {:?} among users", ent.file_name());
                continue;
            }

            let fname = match ent.file_name().into_string() {
                Ok(x) => x,
                Err(e) => {
                    warn!("couldn't convert path into string: {e:?}");
                    continue;
                }
            };

            match self.read_user(&fname) {
                Ok(u) => users.push(u),
                // directory made, creds not written yet
                Err(FindError::NotFound) => continue,
                Err(e) => return Err(e),
            }
        }

        users.sort_by_key(|u| u.id);
        Ok(users)
    }
}

impl Backend {
    pub async fn find_user(&self, username: &str) -> Result<User, FindError> {
        self.read_user(username)
    }

    pub async fn users(&self) -> Result<Vec<User>, ()> {
        self.all_users().map_err(|_| ())
    }

    /// The first user ever created is the admin.
    pub async fn create_user(&self, new_user: &NewUser) -> Result<User, CreateError> {
        let _guard = self.create.lock().await;
        let username = &new_user.username;

        let existing = self.all_users().map_err(|_| CreateError::Internal)?;
        if existing.iter().any(|u| &u.username == username) {
            return Err(CreateError::Taken);
        }

        let id = existing.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        let is_admin = existing.is_empty();

        let dir = self.user_dir(username).map_err(|_| CreateError::Internal)?;

        fs::create_dir_all(self.users_dir()).map_err(|e| {
            error!("create users directory: {e:?}");
            CreateError::Internal
        })?;

        fs::create_dir(&dir).map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                return CreateError::Taken;
            }
            error!("create \"{dir:?}\": {e:?}");
            CreateError::Internal
        })?;

        let mut creds = KeyValues::new();
        creds.insert("id".into(), id.to_string());
        creds.insert("pwhash".into(), new_user.pwhash.clone());
        creds.insert("admin".into(), if is_admin { "1" } else { "0" }.into());

        if let Err(e) = self.write(path!(dir, CREDS), &creds) {
            error!("write \"{username}\": {e:?}");
            if let Err(e) = fs::remove_dir_all(&dir) {
                warn!("couldn't tidy up \"{dir:?}\": {e:?}");
            }
            return Err(CreateError::Internal);
        }

        Ok(User {
            id,
            username: username.clone(),
            pwhash: new_user.pwhash.clone(),
            is_admin,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.into(),
            pwhash: format!("hash-of-{username}"),
        }
    }

    #[tokio::test]
    async fn stray_files_are_not_users() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Backend::new(dir.path()).await;

        backend.create_user(&new_user("alice")).await.unwrap();
        fs::write(dir.path().join("users").join("notes.txt"), "hi").unwrap();

        let bob = backend.create_user(&new_user("bob")).await.unwrap();
        assert_eq!(bob.id, 2);
        assert!(!bob.is_admin);

        let users = backend.users().await.unwrap();
        let names: Vec<_> = users.iter().map(|u| &u.username[..]).collect();
        assert_eq!(names, ["alice", "bob"]);
    }

    #[tokio::test]
    async fn creds_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Backend::new(dir.path()).await;

        let created = backend.create_user(&new_user("alice")).await.unwrap();
        assert!(created.is_admin);
        assert_eq!(backend.find_user("alice").await.unwrap(), created);

        assert!(matches!(
            backend.create_user(&new_user("alice")).await,
            Err(CreateError::Taken)
        ));
        assert!(matches!(
            backend.find_user("../alice").await,
            Err(FindError::NotFound)
        ));
    }
}
