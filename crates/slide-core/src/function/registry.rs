use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use orion_error::prelude::*;
use orion_error::ErrorOweBase;

use super::{TimestampExtractor, WindowFunction};
use crate::error::{CoreReason, CoreResult};

type FunctionFactory<T, O> =
    Arc<dyn Fn(Option<&str>) -> anyhow::Result<Arc<dyn WindowFunction<T, O>>> + Send + Sync>;
type ExtractorFactory<T> =
    Arc<dyn Fn(Option<&str>) -> anyhow::Result<Arc<dyn TimestampExtractor<T>>> + Send + Sync>;

/// Name-keyed table of window function and timestamp extractor factories.
///
/// Keys are looked up as `name` or `name:argument`; the argument is handed to
/// the factory. Entries are typed by their element (and output) type, a
/// lookup with other types is a `TypeMismatch`.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Box<dyn Any + Send + Sync>>,
    extractors: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_function<T, O, F>(&mut self, name: impl Into<String>, factory: F)
    where
        T: 'static,
        O: 'static,
        F: Fn(Option<&str>) -> anyhow::Result<Arc<dyn WindowFunction<T, O>>>
            + Send
            + Sync
            + 'static,
    {
        let factory: FunctionFactory<T, O> = Arc::new(factory);
        self.functions.insert(name.into(), Box::new(factory));
    }

    pub fn register_extractor<T, F>(&mut self, name: impl Into<String>, factory: F)
    where
        T: 'static,
        F: Fn(Option<&str>) -> anyhow::Result<Arc<dyn TimestampExtractor<T>>>
            + Send
            + Sync
            + 'static,
    {
        let factory: ExtractorFactory<T> = Arc::new(factory);
        self.extractors.insert(name.into(), Box::new(factory));
    }

    pub fn resolve_function<T: 'static, O: 'static>(
        &self,
        key: &str,
    ) -> CoreResult<Arc<dyn WindowFunction<T, O>>> {
        let (name, arg) = split_key(key);
        let Some(entry) = self.functions.get(name) else {
            return StructError::from(CoreReason::Configuration)
                .with_detail(format!("unknown window function {name:?}"))
                .err();
        };
        let Some(factory) = entry.downcast_ref::<FunctionFactory<T, O>>() else {
            return StructError::from(CoreReason::TypeMismatch)
                .with_detail(format!(
                    "window function {name:?} is registered for another element or output type"
                ))
                .err();
        };
        factory(arg).owe(CoreReason::Configuration)
    }

    pub fn resolve_extractor<T: 'static>(
        &self,
        key: &str,
    ) -> CoreResult<Arc<dyn TimestampExtractor<T>>> {
        let (name, arg) = split_key(key);
        let Some(entry) = self.extractors.get(name) else {
            return StructError::from(CoreReason::Configuration)
                .with_detail(format!("unknown timestamp extractor {name:?}"))
                .err();
        };
        let Some(factory) = entry.downcast_ref::<ExtractorFactory<T>>() else {
            return StructError::from(CoreReason::TypeMismatch)
                .with_detail(format!(
                    "timestamp extractor {name:?} does not accept the input element type"
                ))
                .err();
        };
        factory(arg).owe(CoreReason::Configuration)
    }

    /// Registered function names, sorted.
    pub fn function_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered extractor names, sorted.
    pub fn extractor_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.extractors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn split_key(key: &str) -> (&str, Option<&str>) {
    match key.split_once(':') {
        Some((name, arg)) => (name.trim(), Some(arg.trim())),
        None => (key.trim(), None),
    }
}
