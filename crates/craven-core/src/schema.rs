#![forbid(unsafe_code)]

//! Model variants: a name, an attribute whitelist and an optional validator.
//!
//! A [`Schema`] is shared as `Rc<Schema>`. Two models are instances of the
//! same variant exactly when they point at the same schema allocation.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::error::{Error, Result, ValidationErrors};
use crate::model::Model;

/// Attribute bag exchanged with models.
pub type Attributes = serde_json::Map<String, Value>;

/// Validation hook. `Err` blocks `save`.
pub type Validator = Rc<dyn Fn(&Model) -> std::result::Result<(), ValidationErrors>>;

/// A model variant.
pub struct Schema {
    name: String,
    attributes: Vec<String>,
    validator: Option<Validator>,
}

impl Schema {
    /// Declare a variant with the given whitelist and no validator.
    pub fn new<I>(name: impl Into<String>, attributes: I) -> Result<Rc<Self>>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self::builder(name).attributes(attributes).build()
    }

    /// Start declaring a variant.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            attributes: Vec::new(),
            validator: None,
        }
    }

    /// Variant name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whitelisted attribute names, in declaration order.
    #[must_use]
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Whether `name` is whitelisted.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }

    /// The variant-wide validator, if any.
    #[must_use]
    pub fn validator(&self) -> Option<&Validator> {
        self.validator.as_ref()
    }

    /// Whitelist projection: every whitelisted key present in `data`, with
    /// its value. Keys absent from `data` are left out, not nulled.
    #[must_use]
    pub fn pick(&self, data: &Attributes) -> Attributes {
        self.attributes
            .iter()
            .filter_map(|key| data.get(key).map(|value| (key.clone(), value.clone())))
            .collect()
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("attributes", &self.attributes)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

/// Builder for [`Schema`].
pub struct SchemaBuilder {
    name: String,
    attributes: Vec<String>,
    validator: Option<Validator>,
}

impl SchemaBuilder {
    /// Whitelist one attribute.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(name.into());
        self
    }

    /// Whitelist several attributes.
    #[must_use]
    pub fn attributes<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.attributes.extend(names.into_iter().map(Into::into));
        self
    }

    /// Install the variant-wide validator.
    #[must_use]
    pub fn validator(
        mut self,
        validator: impl Fn(&Model) -> std::result::Result<(), ValidationErrors> + 'static,
    ) -> Self {
        self.validator = Some(Rc::new(validator));
        self
    }

    /// Finish the declaration.
    ///
    /// Fails on an empty name, an empty attribute name, or a duplicate.
    pub fn build(self) -> Result<Rc<Schema>> {
        let invalid = |reason: String| Error::InvalidSchema {
            schema: self.name.clone(),
            reason,
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty".into()));
        }
        for (i, attr) in self.attributes.iter().enumerate() {
            if attr.is_empty() {
                return Err(invalid("attribute names must not be empty".into()));
            }
            if self.attributes[..i].contains(attr) {
                return Err(invalid(format!("duplicate attribute `{attr}`")));
            }
        }
        Ok(Rc::new(Schema {
            name: self.name,
            attributes: self.attributes,
            validator: self.validator,
        }))
    }
}

impl fmt::Debug for SchemaBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaBuilder")
            .field("name", &self.name)
            .field("attributes", &self.attributes)
            .finish()
    }
}
