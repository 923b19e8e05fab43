//! Stack document persistence
//!
//! The stack service keys documents by stack name and user and authenticates
//! with an API key. [`FileStackStore`] keeps the same documents on disk for
//! offline use.

use super::Stack;
use declarative::RunContext;
use serde::{Deserialize, Serialize, Serializer};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Hosted stack service
pub const DEFAULT_SERVICE_URL: &str = "https://www.pennystackbuilder.com";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request to {url} failed: {message}")]
    Http {
        url: String,
        message: String,
        status: Option<u16>,
    },

    #[error("invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

impl StoreError {
    fn http(url: &str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Http {
                url: url.to_string(),
                message: format!("HTTP {code}"),
                status: Some(code),
            },
            ureq::Error::Json(e) => Self::InvalidResponse {
                url: url.to_string(),
                message: e.to_string(),
            },
            other => Self::Http {
                url: url.to_string(),
                message: other.to_string(),
                status: None,
            },
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Load and save stack documents
pub trait StackStore {
    /// Fetch the stored document, `None` when nothing is stored yet
    fn load(&self, name: &str, user: &str, api_key: &str) -> Result<Option<Stack>, StoreError>;

    fn save(&self, stack: &Stack, api_key: &str) -> Result<(), StoreError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadRequest<'a> {
    name: &'a str,
    user: &'a str,
    api_key: &'a str,
}

#[derive(Deserialize)]
struct LoadResponse {
    #[serde(default)]
    stack: Option<Stack>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveRequest<'a> {
    stack: ServiceStack<'a>,
    api_key: &'a str,
}

/// Stack as the service stores it: the state is a numeric code
#[derive(Serialize)]
struct ServiceStack<'a> {
    name: &'a str,
    user: &'a str,
    state: u8,
    #[serde(serialize_with = "action_map")]
    actions: &'a RunContext,
}

impl<'a> From<&'a Stack> for ServiceStack<'a> {
    fn from(stack: &'a Stack) -> Self {
        Self {
            name: &stack.name,
            user: &stack.user,
            state: stack.run.state().code(),
            actions: &stack.run,
        }
    }
}

fn action_map<S: Serializer>(run: &&RunContext, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(run.actions().map(|action| (&action.name, action)))
}

/// Client of the stack service
pub struct HttpStackStore {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpStackStore {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_SERVICE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/{endpoint}", self.base_url)
    }
}

impl Default for HttpStackStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StackStore for HttpStackStore {
    fn load(&self, name: &str, user: &str, api_key: &str) -> Result<Option<Stack>, StoreError> {
        let url = self.url("load");
        log::debug!("Loading stack {name} for {user} from {url}");
        let response: LoadResponse = self
            .agent
            .post(&url)
            .send_json(&LoadRequest {
                name,
                user,
                api_key,
            })
            .map_err(|e| StoreError::http(&url, e))?
            .body_mut()
            .read_json()
            .map_err(|e| StoreError::http(&url, e))?;
        Ok(response.stack)
    }

    fn save(&self, stack: &Stack, api_key: &str) -> Result<(), StoreError> {
        let url = self.url("save");
        log::debug!("Saving stack {} to {url}", stack.name);
        self.agent
            .post(&url)
            .send_json(&SaveRequest {
                stack: stack.into(),
                api_key,
            })
            .map_err(|e| StoreError::http(&url, e))?;
        Ok(())
    }
}

/// One TOML file per stack and user under a directory
///
/// The API key is not checked.
pub struct FileStackStore {
    dir: PathBuf,
}

impl FileStackStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, name: &str, user: &str) -> PathBuf {
        self.dir.join(format!("{name}.{user}.toml"))
    }
}

impl StackStore for FileStackStore {
    fn load(&self, name: &str, user: &str, _api_key: &str) -> Result<Option<Stack>, StoreError> {
        let path = self.path(name, user);
        if !path.exists() {
            log::debug!("No stack file at {}", path.display());
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
        let stack = toml::from_str(&content).map_err(|e| StoreError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        log::debug!("Loaded stack from {}", path.display());
        Ok(Some(stack))
    }

    fn save(&self, stack: &Stack, _api_key: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let path = self.path(&stack.name, &stack.user);
        let content = toml::to_string_pretty(stack).map_err(|e| StoreError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        fs::write(&path, content).map_err(|e| StoreError::io(&path, e))?;
        log::debug!("Saved stack to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use declarative::{Action, Error, Outcome, ResourceKind, RunState};

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStackStore::new(dir.path().join("stacks"));
        assert!(store.load("s", "u", "").unwrap().is_none());

        let mut stack = Stack::new("s", "u");
        stack.run.record_action(Action::reconciled(
            ResourceKind::Function,
            "f",
            Outcome::Created,
            Utc::now(),
        ));
        stack.run.rollback(&Error::invalid(ResourceKind::Function, "f", "bad"));
        store.save(&stack, "").unwrap();

        let loaded = store.load("s", "u", "").unwrap().unwrap();
        assert_eq!(loaded.run.state(), RunState::Rollback);
        assert_eq!(loaded.run.action("create-function-f"), stack.run.action("create-function-f"));
        assert!(store.load("s", "other", "").unwrap().is_none());
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("s.u.toml"), "name = [").unwrap();
        let err = FileStackStore::new(dir.path()).load("s", "u", "").unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
    }

    #[test]
    fn test_http_endpoints() {
        let store = HttpStackStore::with_base_url("http://localhost:8787/");
        assert_eq!(store.url("load"), "http://localhost:8787/api/load");
        assert_eq!(HttpStackStore::new().url("save"), format!("{DEFAULT_SERVICE_URL}/api/save"));
    }

    #[test]
    fn test_request_bodies() {
        let body = serde_json::to_value(LoadRequest {
            name: "s",
            user: "u",
            api_key: "k",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"name": "s", "user": "u", "apiKey": "k"}));

        let response: LoadResponse = serde_json::from_str("{}").unwrap();
        assert!(response.stack.is_none());
    }

    #[test]
    fn test_service_shaped_load_response() {
        let response: LoadResponse = serde_json::from_str(
            r#"{"stack":{"name":"penny-auth-dev","user":"penny","state":0,"actions":{
                "create-role-r":{"name":"create-role-r","data":{"outcome":"created"}}}}}"#,
        )
        .unwrap();
        let stack = response.stack.unwrap();
        assert_eq!(stack.name, "penny-auth-dev");
        assert_eq!(stack.run.state(), RunState::Ready);
        assert!(stack.run.action("create-role-r").is_some());

        let rolled: LoadResponse = serde_json::from_str(
            r#"{"stack":{"name":"s","user":"u","state":1,"actions":{}}}"#,
        )
        .unwrap();
        assert_eq!(rolled.stack.unwrap().run.state(), RunState::Rollback);

        let missing: LoadResponse = serde_json::from_str(r#"{"stack":null}"#).unwrap();
        assert!(missing.stack.is_none());
    }

    #[test]
    fn test_save_body_uses_numeric_state() {
        let mut stack = Stack::new("s", "u");
        stack.run.record_action(Action {
            name: "create-role-r".into(),
            data: serde_json::json!({"outcome": "created"}),
        });
        stack.run.rollback(&Error::invalid(ResourceKind::Role, "r", "bad"));

        let body = serde_json::to_value(SaveRequest {
            stack: (&stack).into(),
            api_key: "k",
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "stack": {
                    "name": "s",
                    "user": "u",
                    "state": 1,
                    "actions": {
                        "create-role-r": {"name": "create-role-r", "data": {"outcome": "created"}}
                    }
                },
                "apiKey": "k"
            })
        );

        let reloaded: Stack = serde_json::from_value(body["stack"].clone()).unwrap();
        assert_eq!(reloaded, stack);
    }
}
