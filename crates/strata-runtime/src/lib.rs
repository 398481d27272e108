//! strata-runtime: the hierarchical lookup engine.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                    strata-types (leaf)                     │
//! │  Value, Key, Scope                                         │
//! └────────────────────────────────────────────────────────────┘
//!                              ↓
//! ┌────────────────────────────────────────────────────────────┐
//! │                 Runtime Layer (THIS CRATE)                  │
//! ├────────────────────────────────────────────────────────────┤
//! │  config/    : Config, Entry, Location, schema checks       │
//! │  interpolate: %{…} expansion with cycle detection          │
//! │  merge      : first / unique / hash / deep strategies      │
//! │  provider/  : data_hash, data_dig, lookup_key providers    │
//! │  plugin/    : child processes, handshake, HTTP RPC         │
//! │  session/   : Session, Invocation, the lookup pipeline     │
//! │  explain    : diagnostic trace tree                        │
//! └────────────────────────────────────────────────────────────┘
//!                              ↓
//! ┌────────────────────────────────────────────────────────────┐
//! │                 Frontend Layer (strata-cli)                 │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # A lookup, end to end
//!
//! A [`Session`] loads the configuration once and keeps the caches warm.
//! Each call creates an [`Invocation`] which resolves the hierarchy,
//! drives the merge strategy over the providers, interpolates what it
//! finds and digs out the key's remaining parts:
//!
//! ```no_run
//! use strata_runtime::{CallOptions, Session};
//! use strata_types::Key;
//!
//! # fn main() -> Result<(), strata_runtime::LookupError> {
//! let session = Session::builder()
//!     .with_config_path("/etc/app/hiera.yaml")
//!     .build();
//! let mut invocation = session.invocation(None, None);
//! let key = Key::parse("server.port")?;
//! let value = invocation.lookup(&key, None, &CallOptions::default())?;
//! println!("{value:?}");
//! session.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod convert;
mod error;
pub mod explain;
mod interpolate;
pub mod merge;
pub mod plugin;
pub mod provider;
pub mod session;
pub mod yaml;

pub use error::LookupError;
pub use session::{CallOptions, Invocation, Session, SessionBuilder};
