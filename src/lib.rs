//! Populate typed config records from layered sources. Define a struct, tag
//! its fields, and go.
//!
//! Layerfig fills a record from literal defaults, YAML / JSON / TOML
//! documents, environment variables, externally fetched values (files, env,
//! HTTP, or any backend you register) and values derived from other fields
//! through a small template language.
//!
//! ```ignore
//! #[derive(Record, Deserialize, Default)]
//! #[serde(default)]
//! pub struct AppConfig {
//!     #[record(default = "localhost")]
//!     pub host: String,
//!     #[record(env = "PORT", default = "8080")]
//!     pub port: u16,
//!     #[record(env = "DB_USER")]
//!     pub user: String,
//!     #[record(ref = "file:///run/secrets/db_pass")]
//!     pub pass: String,
//!     #[record(dsn = "postgres://${.user}:${.pass}@${.host}/app")]
//!     pub dsn: String,
//! }
//!
//! let config: AppConfig = Layerfig::builder()
//!     .app_name("myapp")
//!     .load()?;
//! ```
//!
//! That call searches the platform config directory for `myapp.yaml`,
//! decodes it, then walks the record: `PORT` and `DB_USER` are read from the
//! environment, `pass` is read from a file when nothing else set it, the
//! defaults fill what is still empty and `dsn` is composed last.
//!
//! # The record is the schema
//!
//! `#[derive(Record)]` generates a static descriptor of the struct: every
//! `pub` field with its document key (serde `rename` / `rename_all` aware),
//! its tags and the shape of its type. Private fields and fields marked
//! `#[record(skip)]` are not walked. Nested records, `Vec`, `HashMap`,
//! `BTreeMap`, `Option`, `Box` and `Rc<RefCell<_>>` are descended.
//!
//! # Field tags
//!
//! | Tag | Effect |
//! |-----|--------|
//! | `env = "KEY"` | read `KEY` (with the optional prefix) and always assign when set, even to `""` |
//! | `ref = "uri"` | fetch the value from a resolver when the field is still zero |
//! | `ref_from = "field"` | take the URI from a sibling field; beats `ref` |
//! | `default = "literal"` | convert the literal when the field is still zero |
//! | `dsn = "template"` | render a template against the struct after all siblings are done |
//! | `dsn_strict` | fail on undefined template lookups instead of rendering them empty |
//! | `skip` | leave the field alone |
//!
//! The container attribute `#[record(set_defaults)]` calls
//! [`SetDefaults::set_defaults`] once every field of that struct is resolved.
//!
//! # Layer precedence
//!
//! ```text
//! Defaults / refs / dsn   only fill zero-valued fields
//!        ↑ overridden by
//! Documents              search paths, then .file(), then .document(); later wins
//!        ↑ overridden by
//! Overrides              .set_override("database.url", ...)
//!        ↑ overridden by
//! Environment            env = "..." tags
//! ```
//!
//! Lower layers never replace a value a higher layer set; a field that is
//! non-zero after decoding keeps its value unless an `env` tag fires.
//!
//! # References
//!
//! References are `scheme://rest` URIs dispatched through a [`Resolvers`]
//! registry. `file` and `env` are registered by default, `http` / `https`
//! with the `http` feature. A URI without a scheme is read as a file path.
//! A *not found* result moves on to the next source and never fails a load.
//!
//! # Templates
//!
//! `${.field}`, `${env:KEY}` and `${ref:uri}` segments, with `trim`,
//! `upper`, `lower`, `default("x")` and (feature `url`) `urlencode` filters.
//! `$${` is a literal `${`. See the [`expr`] module.
//!
//! # Units
//!
//! Integers accept byte sizes (`1KiB` = 1024, `1KB` = 1000, `0.5MiB`);
//! durations accept `ns us µs ms s m h d` sequences (`1d12h`, `-1d`). In
//! documents the same forms work through [`serde_duration`] and type-directed
//! preprocessing of the merged tree.
//!
//! # Strict mode
//!
//! Strict mode is **on by default**. A document key that matches no field
//! fails the load with the document and line:
//!
//! ```text
//! Unknown key 'typo_key' in /home/user/.config/myapp/myapp.yaml (line 5)
//! ```
//!
//! # Error handling
//!
//! All fallible operations return [`LayerfigError`]. Field failures carry the
//! field path, the tag that failed and the origin of the load; see the
//! [`error`] module.

extern crate self as layerfig;

pub mod backend;
pub mod convert;
pub mod document;
pub mod env;
pub mod error;
pub mod expr;
pub mod meta;
pub mod record;
pub mod resolver;
pub mod serde_duration;
pub mod types;
pub mod units;
pub mod walk;

mod builder;
mod file;
pub(crate) mod merge;
mod overrides;
mod pipeline;
mod preprocess;
mod resolve;
mod validate;
mod value;

#[cfg(test)]
mod fixtures;

pub use builder::{Layerfig, LayerfigBuilder};
pub use convert::{BoxError, ConvertError};
pub use document::Document;
pub use env::Environment;
pub use error::{FieldCause, FieldError, LayerfigError, Tag, ValidationError};
pub use layerfig_derive::Record;
pub use record::{Record, SetDefaults};
pub use resolver::{CancelToken, Context, ResolveError, Resolver, Resolvers};
pub use types::{Boundary, Format, SearchMode, SearchPath};
pub use value::Scan;
pub use walk::{Segment, Walker};
