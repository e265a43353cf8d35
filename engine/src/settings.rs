//! Reconciliation settings.
//!
//! An engine carries instance-level defaults; a call may pass overrides. Every
//! option present in the overrides replaces the default as a whole, there is no
//! per-field deep merge.

use crate::{is_same_record, FieldName, Pipeline, Record};
use serde::Deserialize;

/// Options controlling one reconciliation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Fields whose joint equality makes two records the same entity.
    /// Defaults to the primary key.
    pub identity_fields: Option<Vec<FieldName>>,
    /// Fields compared to decide whether a matched record needs a write.
    /// Defaults to every field of the current record.
    pub change_fields: Option<Vec<FieldName>>,
    /// Fields copied from the desired record during an update.
    /// Defaults to every field of the desired record.
    pub update_fields: Option<Vec<FieldName>>,
    /// Ordered mutation handlers. Defaults to delete, add, update.
    #[serde(skip)]
    pub pipeline: Option<Pipeline>,
}

impl Settings {
    /// Settings with every option unset.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<FieldName>,
    {
        self.identity_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_change_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<FieldName>,
    {
        self.change_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_update_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<FieldName>,
    {
        self.update_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Replace every option that `overrides` sets.
    pub fn merge_with(mut self, overrides: Option<&Settings>) -> Self {
        let Some(overrides) = overrides else {
            return self;
        };

        if let Some(fields) = &overrides.identity_fields {
            self.identity_fields = Some(fields.clone());
        }
        if let Some(fields) = &overrides.change_fields {
            self.change_fields = Some(fields.clone());
        }
        if let Some(fields) = &overrides.update_fields {
            self.update_fields = Some(fields.clone());
        }
        if let Some(pipeline) = &overrides.pipeline {
            self.pipeline = Some(pipeline.clone());
        }

        self
    }

    /// Identity fields, empty when unset.
    pub fn identity(&self) -> &[FieldName] {
        self.identity_fields.as_deref().unwrap_or_default()
    }

    /// Whether two records are the same entity under these settings.
    pub fn is_same_record(&self, a: &Record, b: &Record) -> bool {
        is_same_record(a, b, self.identity())
    }
}
