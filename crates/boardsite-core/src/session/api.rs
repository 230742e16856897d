//! HTTP request layer of the board API.

use super::message::{
    ConnectedUsers, CreatedAttachment, CreatedSession, MetaUpdate, PageIds, PageSync, PageSyncEntry, PostPages, User,
};
use super::{SessionError, SessionResult};
use crate::page::PageMeta;
use crate::stroke::PageId;
use reqwest::blocking::{Client, RequestBuilder, multipart};
use reqwest::{Method, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "Boardsite-User-Id";

/// Requests issued by a board session.
///
/// The API tracks the session it talks to and the user it acts for; the
/// user id is learned from [`post_user`](Self::post_user).
pub trait SessionApi: Send {
    fn set_session_id(&mut self, session_id: Option<String>);

    fn set_user_id(&mut self, user_id: Option<String>);

    /// Create a session and return its id.
    fn post_session(&self) -> SessionResult<String>;

    /// Register `user` in the current session.
    fn post_user(&mut self, user: &User) -> SessionResult<User>;

    fn put_user(&self, user: &User) -> SessionResult<()>;

    fn get_users(&self) -> SessionResult<ConnectedUsers>;

    fn get_page_rank(&self) -> SessionResult<Vec<PageId>>;

    fn get_page(&self, page_id: &str) -> SessionResult<PageSyncEntry>;

    fn post_pages(&self, pages: &[(PageId, PageMeta)], indices: &[usize]) -> SessionResult<()>;

    fn update_pages_meta(&self, meta: &HashMap<PageId, PageMeta>) -> SessionResult<()>;

    fn clear_pages(&self, page_ids: &[PageId]) -> SessionResult<()>;

    fn delete_pages(&self, page_ids: &[PageId]) -> SessionResult<()>;

    fn get_pages_sync(&self) -> SessionResult<PageSync>;

    fn post_pages_sync(&self, sync: &PageSync) -> SessionResult<()>;

    /// Upload a file and return its attachment id.
    fn post_attachment(&self, file_name: &str, data: Vec<u8>) -> SessionResult<String>;

    fn get_attachment(&self, attach_id: &str) -> SessionResult<Vec<u8>>;
}

/// Parse a response body as JSON, keeping non-JSON bodies as a string.
pub fn parse_body(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn decode<T: DeserializeOwned>(value: Value) -> SessionResult<T> {
    serde_json::from_value(value).map_err(|e| SessionError::Decode(e.to_string()))
}

fn network_error(err: reqwest::Error) -> SessionError {
    if err.is_timeout() {
        SessionError::Network("request timed out".to_string())
    } else {
        SessionError::Network(err.to_string())
    }
}

/// Board API over blocking HTTP.
pub struct HttpApi {
    client: Client,
    /// `{api_url}b/`
    base: Url,
    session_id: Option<String>,
    user_id: Option<String>,
}

impl HttpApi {
    pub fn new(api_url: &Url, timeout: Duration) -> SessionResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(network_error)?;
        let base = api_url
            .join("b/")
            .map_err(|e| SessionError::Network(format!("Invalid API URL: {}", e)))?;
        Ok(Self {
            client,
            base,
            session_id: None,
            user_id: None,
        })
    }

    fn session_path(&self, path: &str) -> SessionResult<Url> {
        let sid = self.session_id.as_deref().ok_or(SessionError::NotConnected)?;
        self.url(&format!("{}/{}", sid, path))
    }

    fn url(&self, path: &str) -> SessionResult<Url> {
        self.base
            .join(path)
            .map_err(|e| SessionError::Network(format!("Invalid request path {}: {}", path, e)))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, url)
            .header(header::ACCEPT, "application/json");
        if let Some(uid) = &self.user_id {
            builder = builder.header(USER_ID_HEADER, uid);
        }
        builder
    }

    fn execute(&self, builder: RequestBuilder) -> SessionResult<Value> {
        let response = builder.send().map_err(network_error)?;
        let status = response.status();
        let text = response.text().map_err(network_error)?;
        if !status.is_success() {
            return Err(SessionError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(parse_body(&text))
    }

    fn send_json<B: Serialize>(&self, method: Method, url: Url, body: &B) -> SessionResult<Value> {
        log::debug!("{} {}", method, url);
        self.execute(self.request(method, url).json(body))
    }

    fn get(&self, url: Url) -> SessionResult<Value> {
        log::debug!("GET {}", url);
        self.execute(self.request(Method::GET, url))
    }
}

impl SessionApi for HttpApi {
    fn set_session_id(&mut self, session_id: Option<String>) {
        self.session_id = session_id;
    }

    fn set_user_id(&mut self, user_id: Option<String>) {
        self.user_id = user_id;
    }

    fn post_session(&self) -> SessionResult<String> {
        let url = self.url("create")?;
        let created: CreatedSession = decode(self.send_json(Method::POST, url, &Value::Null)?)?;
        Ok(created.session_id)
    }

    fn post_user(&mut self, user: &User) -> SessionResult<User> {
        let url = self.session_path("users")?;
        let body = User {
            id: None,
            ..user.clone()
        };
        let registered: User = decode(self.send_json(Method::POST, url, &body)?)?;
        if registered.id.as_deref().is_none_or(str::is_empty) {
            return Err(SessionError::Decode("registered user has no id".to_string()));
        }
        self.user_id = registered.id.clone();
        Ok(registered)
    }

    fn put_user(&self, user: &User) -> SessionResult<()> {
        let uid = self.user_id.as_deref().ok_or(SessionError::NotRegistered)?;
        let url = self.session_path(&format!("users/{}", uid))?;
        self.send_json(Method::PUT, url, user).map(drop)
    }

    fn get_users(&self) -> SessionResult<ConnectedUsers> {
        decode(self.get(self.session_path("users")?)?)
    }

    fn get_page_rank(&self) -> SessionResult<Vec<PageId>> {
        decode(self.get(self.session_path("pages")?)?)
    }

    fn get_page(&self, page_id: &str) -> SessionResult<PageSyncEntry> {
        decode(self.get(self.session_path(&format!("pages/{}", page_id))?)?)
    }

    fn post_pages(&self, pages: &[(PageId, PageMeta)], indices: &[usize]) -> SessionResult<()> {
        let body = PostPages {
            page_id: pages.iter().map(|(id, _)| id.clone()).collect(),
            index: indices.to_vec(),
            meta: pages.iter().cloned().collect(),
        };
        self.send_json(Method::POST, self.session_path("pages")?, &body).map(drop)
    }

    fn update_pages_meta(&self, meta: &HashMap<PageId, PageMeta>) -> SessionResult<()> {
        let body = MetaUpdate { meta: meta.clone() };
        self.send_json(Method::PUT, self.session_path("pages?update=meta")?, &body)
            .map(drop)
    }

    fn clear_pages(&self, page_ids: &[PageId]) -> SessionResult<()> {
        let body = PageIds {
            page_id: page_ids.to_vec(),
        };
        self.send_json(Method::PUT, self.session_path("pages?update=clear")?, &body)
            .map(drop)
    }

    fn delete_pages(&self, page_ids: &[PageId]) -> SessionResult<()> {
        let body = PageIds {
            page_id: page_ids.to_vec(),
        };
        self.send_json(Method::PUT, self.session_path("pages?update=delete")?, &body)
            .map(drop)
    }

    fn get_pages_sync(&self) -> SessionResult<PageSync> {
        decode(self.get(self.session_path("pages/sync")?)?)
    }

    fn post_pages_sync(&self, sync: &PageSync) -> SessionResult<()> {
        self.send_json(Method::POST, self.session_path("pages/sync")?, sync)
            .map(drop)
    }

    fn post_attachment(&self, file_name: &str, data: Vec<u8>) -> SessionResult<String> {
        let url = self.session_path("attachments")?;
        log::debug!("POST {} ({} bytes)", url, data.len());
        let part = multipart::Part::bytes(data).file_name(file_name.to_string());
        let form = multipart::Form::new().part("file", part);
        let created: CreatedAttachment = decode(self.execute(self.request(Method::POST, url).multipart(form))?)?;
        Ok(created.attach_id)
    }

    fn get_attachment(&self, attach_id: &str) -> SessionResult<Vec<u8>> {
        let url = self.session_path(&format!("attachments/{}", attach_id))?;
        log::debug!("GET {}", url);
        let response = self
            .request(Method::GET, url)
            .header(header::ACCEPT, "application/pdf")
            .send()
            .map_err(network_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Status {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }
        Ok(response.bytes().map_err(network_error)?.to_vec())
    }
}
