//! Depth-first traversal of a record graph.
//!
//! Nested values are descended before a field's own attributes run, so a
//! struct field is fully resolved by the time its parent looks at it.
//! Pointer nodes (`Box`, `Rc<RefCell<_>>`) are tracked by address for the
//! duration of one walk; reaching the same node twice is a cycle error.

use std::collections::HashSet;
use std::fmt::{self, Write as _};

use crate::env::Environment;
use crate::error::{FieldCause, FieldError, LayerfigError, Tag};
use crate::meta::RecordDescriptor;
use crate::pipeline;
use crate::record::Record;
use crate::resolver::{Context, Resolvers};

/// One step in a field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(&'static str),
    Index(usize),
    Key(String),
}

/// State of one resolution pass.
pub struct Walker<'a> {
    env: &'a Environment,
    resolvers: &'a Resolvers,
    context: &'a Context,
    visited: HashSet<usize>,
    path: Vec<Segment>,
}

impl<'a> Walker<'a> {
    pub fn new(env: &'a Environment, resolvers: &'a Resolvers, context: &'a Context) -> Self {
        Self {
            env,
            resolvers,
            context,
            visited: HashSet::new(),
            path: Vec::new(),
        }
    }

    pub fn env(&self) -> &'a Environment {
        self.env
    }

    pub fn resolvers(&self) -> &'a Resolvers {
        self.resolvers
    }

    pub fn context(&self) -> &'a Context {
        self.context
    }

    /// Resolve a caller-owned root record.
    pub fn walk_root<R: Record>(&mut self, record: &mut R) -> Result<(), LayerfigError> {
        if size_of::<R>() > 0 {
            self.visited.insert(&*record as *const R as *const () as usize);
        }
        record.walk(self)
    }

    /// Run every field of `record` through its sources, then the derived
    /// pass, then the post-order hook.
    pub fn walk_record<R: Record>(&mut self, record: &mut R) -> Result<(), LayerfigError> {
        let descriptor = R::descriptor();
        self.check_declarations(descriptor)?;

        let mut settled = vec![false; descriptor.fields.len()];
        for (index, field) in descriptor.fields.iter().enumerate() {
            settled[index] = self.with_segment(Segment::Field(field.name), |w| {
                record.field_mut(index).walk(w)?;
                Ok(pipeline::apply_sources(w, record, index)?)
            })?;
        }

        for (index, field) in descriptor.fields.iter().enumerate() {
            if field.tags.dsn.is_none() || settled[index] {
                continue;
            }
            self.with_segment(Segment::Field(field.name), |w| {
                Ok(pipeline::apply_derived(w, record, index)?)
            })?;
        }

        record
            .finalize()
            .map_err(|e| FieldError::new(self.path(), Tag::SetDefaults, FieldCause::Hook(e)))?;
        Ok(())
    }

    fn check_declarations(&self, descriptor: &RecordDescriptor) -> Result<(), LayerfigError> {
        for field in descriptor.fields {
            if field.tags.dsn.is_none() {
                continue;
            }
            let shape = (field.shape)();
            if !shape.is_text() {
                let path = self.child_path(field.name);
                return Err(FieldError::new(
                    path,
                    Tag::Dsn,
                    FieldCause::NotAString {
                        shape: format!("{shape:?}"),
                    },
                )
                .into());
            }
        }
        Ok(())
    }

    /// Mark a pointer node as visited, failing if it already was.
    pub fn enter_pointer(
        &mut self,
        address: usize,
        type_name: &'static str,
    ) -> Result<(), LayerfigError> {
        if self.visited.insert(address) {
            Ok(())
        } else {
            Err(self.cycle_error(type_name))
        }
    }

    pub fn cycle_error(&self, type_name: &'static str) -> LayerfigError {
        LayerfigError::Cycle {
            type_name,
            path: self.path(),
        }
    }

    /// Run `f` with `segment` appended to the current path.
    pub fn with_segment<T>(
        &mut self,
        segment: Segment,
        f: impl FnOnce(&mut Self) -> Result<T, LayerfigError>,
    ) -> Result<T, LayerfigError> {
        self.path.push(segment);
        let result = f(self);
        self.path.pop();
        result
    }

    /// The current field path, e.g. `servers[0].tls.cert`.
    pub fn path(&self) -> String {
        if self.path.is_empty() {
            return "<root>".to_string();
        }
        PathDisplay(&self.path).to_string()
    }

    fn child_path(&self, name: &'static str) -> String {
        let mut segments = self.path.clone();
        segments.push(Segment::Field(name));
        PathDisplay(&segments).to_string()
    }
}

struct PathDisplay<'p>(&'p [Segment]);

impl fmt::Display for PathDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Field(name) if i == 0 => f.write_str(name)?,
                Segment::Field(name) => {
                    f.write_char('.')?;
                    f.write_str(name)?;
                }
                Segment::Index(index) => write!(f, "[{index}]")?,
                Segment::Key(key) => write!(f, "[{key}]")?,
            }
        }
        Ok(())
    }
}
