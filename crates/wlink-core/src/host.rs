//! Host environment abstraction.
//!
//! The application embedding wlink owns deep-link delivery and the embedded
//! browser. It exposes both through [`HostEnvironment`]; the round-trip
//! coordinator only registers callbacks and asks for the browser to open or
//! close.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::listeners::ListenerId;

/// Called with the full URL of every deep link the host receives.
pub type DeepLinkCallback = Box<dyn Fn(String) + Send + Sync>;

/// Called when the user dismisses the embedded browser.
pub type DismissCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("failed to open browser: {0}")]
    LaunchFailed(String),

    #[error("host environment unavailable")]
    Unavailable,
}

/// How the embedded browser is presented.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presentation {
    #[default]
    FormSheet,
    PageSheet,
    FullScreen,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserOptions {
    pub presentation: Presentation,
}

#[async_trait]
pub trait HostEnvironment: Send + Sync {
    fn add_deep_link_listener(&self, callback: DeepLinkCallback) -> ListenerId;

    /// Unregister a deep-link callback. Unknown ids are ignored.
    fn remove_deep_link_listener(&self, id: ListenerId);

    fn add_dismiss_listener(&self, callback: DismissCallback) -> ListenerId;

    /// Unregister a dismissal callback. Unknown ids are ignored.
    fn remove_dismiss_listener(&self, id: ListenerId);

    /// Open `url` in an embedded browser view.
    async fn open_browser(&self, url: &Url, options: &BrowserOptions) -> Result<(), HostError>;

    /// Close the embedded browser if it is open.
    async fn close_browser(&self);
}
