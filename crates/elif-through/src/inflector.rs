//! Name inflection used for relation lookups and naming conventions

use heck::{ToSnakeCase, ToUpperCamelCase};

/// Pluralization and naming conventions consulted by the resolver
pub trait Inflector: Send + Sync {
    fn pluralize(&self, word: &str) -> String;

    fn singularize(&self, word: &str) -> String;

    /// Model name for a relation name (`user_has_groups` -> `UserHasGroup`)
    fn classify(&self, name: &str) -> String {
        self.singularize(&name.to_snake_case()).to_upper_camel_case()
    }

    /// Default table name for a model (`UserHasGroup` -> `user_has_groups`)
    fn tableize(&self, model: &str) -> String {
        self.pluralize(&model.to_snake_case())
    }

    /// Conventional foreign key pointing at a model (`User` -> `user_id`)
    fn foreign_key(&self, model: &str) -> String {
        format!("{}_id", self.singularize(&model.to_snake_case()))
    }
}

impl<T: Inflector + ?Sized> Inflector for std::sync::Arc<T> {
    fn pluralize(&self, word: &str) -> String {
        (**self).pluralize(word)
    }

    fn singularize(&self, word: &str) -> String {
        (**self).singularize(word)
    }

    fn classify(&self, name: &str) -> String {
        (**self).classify(name)
    }

    fn tableize(&self, model: &str) -> String {
        (**self).tableize(model)
    }

    fn foreign_key(&self, model: &str) -> String {
        (**self).foreign_key(model)
    }
}

/// English inflection backed by the `pluralizer` rule set
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultInflector;

impl Inflector for DefaultInflector {
    fn pluralize(&self, word: &str) -> String {
        pluralizer::pluralize(word, 2, false)
    }

    fn singularize(&self, word: &str) -> String {
        pluralizer::pluralize(word, 1, false)
    }
}
