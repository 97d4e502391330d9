//! Core resolution pipeline: merge all document layers, decode, then walk.
//!
//! Operates on pre-loaded data (`ResolveInput`) with no I/O besides the
//! resolvers, making the full pipeline testable with synthetic inputs. Steps:
//!
//! 1. Expand `${env:..}` / `${ref:..}` in raw documents (if enabled)
//! 2. Parse and deep-merge documents (later overrides earlier)
//! 3. Deep-merge dotted-key overrides on top
//! 4. Type-directed preprocessing (day durations, byte sizes)
//! 5. Decode into `C`, reporting unknown keys in strict mode
//! 6. Walk the record: env, references, defaults, derived values, hooks

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::document::{Document, DocumentScope};
use crate::env::Environment;
use crate::error::LayerfigError;
use crate::merge::deep_merge;
use crate::overrides;
use crate::preprocess::preprocess;
use crate::record::Record;
use crate::resolver::{Context, Resolvers};
use crate::validate;
use crate::walk::Walker;

/// All pre-loaded data needed to resolve a config.
pub struct ResolveInput {
    /// Documents in precedence order: first = lowest priority, last = highest.
    pub documents: Vec<Document>,
    /// Environment snapshot with the prefix applied to `env` tags.
    pub env: Environment,
    /// Programmatic overrides as `(dotted_key, value)` pairs. They form the
    /// highest document layer; `env` tags still win over them.
    pub overrides: Vec<(String, Value)>,
    /// Whether to reject unknown keys in documents and overrides.
    pub strict: bool,
    /// Whether to expand templates in raw documents before parsing.
    pub template_documents: bool,
}

/// Resolve configuration from pre-loaded inputs.
pub fn resolve<C>(
    input: ResolveInput,
    resolvers: &Resolvers,
    context: &Context,
) -> Result<C, LayerfigError>
where
    C: Record + DeserializeOwned + Default,
{
    let ResolveInput {
        mut documents,
        env,
        overrides,
        strict,
        template_documents,
    } = input;

    // 1: Template pass over raw text
    if template_documents {
        let scope = DocumentScope {
            env: &env,
            resolvers,
            context,
        };
        for document in &mut documents {
            document.expand_templates(&scope)?;
        }
    }

    // 2: Parse and merge document layers
    let mut merged = Map::new();
    for document in &documents {
        merged = deep_merge(merged, document.parse()?);
        debug!(origin = %document.origin, "merged document");
    }

    // 3: Overrides on top
    if !overrides.is_empty() {
        if strict {
            check_override_keys::<C>(&overrides)?;
        }
        merged = deep_merge(merged, overrides::overrides_to_map(&overrides)?);
    }

    // 4-5: Preprocess and decode
    let mut config: C = if documents.is_empty() && overrides.is_empty() {
        C::default()
    } else {
        preprocess(&mut merged, C::descriptor())?;
        validate::decode(merged, &documents, strict)?
    };

    // 6: Walk
    let origin = origin_of::<C>(&documents);
    walk(&mut config, &env, resolvers, context, &origin)?;
    Ok(config)
}

/// Run the record walk on a caller-owned record, attributing field errors
/// to `origin`.
pub fn walk<C: Record>(
    record: &mut C,
    env: &Environment,
    resolvers: &Resolvers,
    context: &Context,
    origin: &str,
) -> Result<(), LayerfigError> {
    Walker::new(env, resolvers, context)
        .walk_root(record)
        .map_err(|e| e.with_origin(origin))
}

fn check_override_keys<C: Record>(overrides: &[(String, Value)]) -> Result<(), LayerfigError> {
    let unknown: Vec<LayerfigError> = overrides
        .iter()
        .filter(|(key, _)| !overrides::is_known_key(C::descriptor(), key))
        .map(|(key, _)| LayerfigError::UnknownKey {
            key: key.clone(),
            origin: "<override>".into(),
            line: 0,
        })
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(LayerfigError::UnknownKeys(unknown))
    }
}

/// Identifier of one load: the document origins, or the record type when
/// there are none.
pub(crate) fn origin_of<C: Record>(documents: &[Document]) -> String {
    if documents.is_empty() {
        C::descriptor().type_name.to_string()
    } else {
        documents
            .iter()
            .map(|d| d.origin.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
