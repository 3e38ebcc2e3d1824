use std::collections::HashMap;
use std::sync::Mutex;

use log::{debug, error};

use crate::auth::SessionId;
use crate::site::{Error, Result};
use crate::time::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: i64,
    pub username: String,
    pub expires: Timestamp,
    pub persistent: bool,
}

impl Session {
    fn expired(&self, now: Timestamp) -> bool {
        now >= self.expires
    }
}

/// Live sessions. Held in memory only, a restart logs everyone out.
#[derive(Default)]
pub struct Sessions {
    live: Mutex<HashMap<SessionId, Session>>,
}

impl Sessions {
    fn with<R>(&self, f: impl FnOnce(&mut HashMap<SessionId, Session>) -> R) -> Result<R> {
        let mut live = self.live.lock().map_err(|e| {
            error!("session store poisoned: {e}");
            Error::Internal
        })?;

        Ok(f(&mut live))
    }

    pub fn insert(&self, session: Session, now: Timestamp) -> Result<SessionId> {
        let id = SessionId::new();

        self.with(|live| {
            let before = live.len();
            live.retain(|_, s| !s.expired(now));
            if live.len() != before {
                debug!("swept {} expired sessions", before - live.len());
            }

            live.insert(id, session);
        })?;

        Ok(id)
    }

    pub fn get(&self, id: &SessionId, now: Timestamp) -> Result<Option<Session>> {
        self.with(|live| {
            let session = live.get(id).cloned()?;

            if session.expired(now) {
                debug!("session {id} expired at {}", session.expires);
                live.remove(id);
                return None;
            }
            Some(session)
        })
    }

    pub fn remove(&self, id: &SessionId) -> Result<bool> {
        self.with(|live| live.remove(id).is_some())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.with(|live| live.len()).unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn session(user_id: i64, expires: i64) -> Session {
        Session {
            user_id,
            username: format!("user{user_id}"),
            expires: Timestamp::from_i64(expires),
            persistent: false,
        }
    }

    #[test]
    fn lookup_until_expiry() {
        let sessions = Sessions::default();
        let id = sessions.insert(session(1, 100), Timestamp::from_i64(10)).unwrap();

        assert_eq!(
            sessions.get(&id, Timestamp::from_i64(99)).unwrap(),
            Some(session(1, 100))
        );
        assert_eq!(sessions.get(&id, Timestamp::from_i64(100)).unwrap(), None);
        assert_eq!(sessions.len(), 0);
    }

    #[test]
    fn insert_sweeps_expired() {
        let sessions = Sessions::default();
        sessions.insert(session(1, 50), Timestamp::from_i64(10)).unwrap();
        sessions.insert(session(2, 500), Timestamp::from_i64(10)).unwrap();
        assert_eq!(sessions.len(), 2);

        sessions.insert(session(3, 500), Timestamp::from_i64(60)).unwrap();
        assert_eq!(sessions.len(), 2);
    }

    #[test]
    fn remove_is_once() {
        let sessions = Sessions::default();
        let id = sessions.insert(session(1, 100), Timestamp::from_i64(0)).unwrap();

        assert!(sessions.remove(&id).unwrap());
        assert!(!sessions.remove(&id).unwrap());
        assert_eq!(sessions.get(&id, Timestamp::from_i64(0)).unwrap(), None);
    }
}
