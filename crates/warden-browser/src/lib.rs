//! Warden Browser - Layer-2 script execution in a real browser.
//!
//! A single headless Chrome/Chromium is launched lazily and shared across
//! calls; each execution gets a fresh page (DevTools target), closed on
//! every outcome. Scripts run via `Runtime.evaluate` inside the page, never
//! in this process, with console output and page exceptions captured over
//! the DevTools protocol.
//!
//! [`BrowserRuntime`] implements the `BrowserAutomation` trait from
//! `warden-sandbox`, so it plugs straight into the sandbox pipeline.
//!
//! These tests never launch a real browser; message parsing and protocol
//! assembly are covered, end-to-end behavior is exercised by callers with
//! a browser available.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod cdp;
/// Error types for the browser module.
pub mod error;
pub mod launcher;
pub mod runtime;

pub use cdp::{CdpConnection, CdpEvent};
pub use error::{BrowserError, BrowserResult};
pub use launcher::{BrowserProcess, find_browser_binary};
pub use runtime::BrowserRuntime;
