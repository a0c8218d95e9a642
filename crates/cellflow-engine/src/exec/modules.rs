//! Sandbox capabilities for script cells.
//!
//! Conventions:
//! - Storage accessors are plain functions (`storage_get`, `storage_set`, ...).
//! - Importable modules are static and must be on the configured allowlist;
//!   there is no file system resolver.
//! - If you add a new module, list it in `BUILTIN_MODULES` and build it in
//!   `build_module`.

use rhai::module_resolvers::StaticModuleResolver;
use rhai::{Array, Dynamic, Engine, EvalAltResult, FLOAT, INT, Module, Position};

use crate::storage::StorageChannel;

pub const BUILTIN_MODULES: &[&str] = &["stats", "text"];

fn invalid_arg(message: &str) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(message.into(), Position::NONE).into()
}

fn numbers(values: &Array) -> Result<Vec<f64>, Box<EvalAltResult>> {
    values
        .iter()
        .map(|v| {
            if let Ok(n) = v.as_float() {
                return Ok(n);
            }
            if let Ok(n) = v.as_int() {
                return Ok(n as f64);
            }
            Err(invalid_arg(&format!(
                "expected a number, found {}",
                v.type_name()
            )))
        })
        .collect()
}

/// Register the storage side-channel accessors.
pub fn register_storage(engine: &mut Engine, storage: StorageChannel) {
    let get = storage.clone();
    engine.register_fn("storage_get", move |key: &str| -> Dynamic {
        get.get_storage_value(key).unwrap_or(Dynamic::UNIT)
    });

    let has = storage.clone();
    engine.register_fn("storage_has", move |key: &str| -> bool {
        has.has_storage_key(key)
    });

    let keys = storage.clone();
    engine.register_fn("storage_keys", move || -> Array {
        keys.get_storage_keys()
            .into_iter()
            .map(Dynamic::from)
            .collect()
    });

    let set = storage;
    engine.register_fn("storage_set", move |key: &str, value: Dynamic| {
        set.set_storage_value(key, value);
    });
}

/// Build a resolver that only knows the allowlisted modules.
///
/// `max_string_size` caps strings the modules build themselves (0 = no cap).
pub fn module_resolver(allowlist: &[String], max_string_size: usize) -> StaticModuleResolver {
    let mut resolver = StaticModuleResolver::new();
    for name in allowlist {
        if let Some(module) = build_module(name, max_string_size) {
            resolver.insert(name.as_str(), module);
        } else {
            tracing::warn!(module = name.as_str(), "unknown module in allowlist ignored");
        }
    }
    resolver
}

fn build_module(name: &str, max_string_size: usize) -> Option<Module> {
    let mut module = match name {
        "stats" => stats_module(),
        "text" => text_module(max_string_size),
        _ => return None,
    };
    module.build_index();
    Some(module)
}

fn stats_module() -> Module {
    let mut module = Module::new();

    module.set_native_fn("sum", |values: Array| -> Result<FLOAT, Box<EvalAltResult>> {
        Ok(numbers(&values)?.iter().sum())
    });

    module.set_native_fn("mean", |values: Array| -> Result<FLOAT, Box<EvalAltResult>> {
        let values = numbers(&values)?;
        if values.is_empty() {
            return Err(invalid_arg("mean of an empty array"));
        }
        Ok(values.iter().sum::<f64>() / values.len() as f64)
    });

    module.set_native_fn("median", |values: Array| -> Result<FLOAT, Box<EvalAltResult>> {
        let mut values = numbers(&values)?;
        if values.is_empty() {
            return Err(invalid_arg("median of an empty array"));
        }
        values.sort_by(|a, b| a.total_cmp(b));
        let mid = values.len() / 2;
        if values.len() % 2 == 0 {
            Ok((values[mid - 1] + values[mid]) / 2.0)
        } else {
            Ok(values[mid])
        }
    });

    module.set_native_fn("min", |values: Array| -> Result<FLOAT, Box<EvalAltResult>> {
        numbers(&values)?
            .into_iter()
            .reduce(f64::min)
            .ok_or_else(|| invalid_arg("min of an empty array"))
    });

    module.set_native_fn("max", |values: Array| -> Result<FLOAT, Box<EvalAltResult>> {
        numbers(&values)?
            .into_iter()
            .reduce(f64::max)
            .ok_or_else(|| invalid_arg("max of an empty array"))
    });

    module.set_native_fn("count", |values: Array| -> Result<INT, Box<EvalAltResult>> {
        Ok(values.len() as INT)
    });

    module
}

fn text_module(max_string_size: usize) -> Module {
    let mut module = Module::new();

    module.set_native_fn("words", |text: &str| -> Result<Array, Box<EvalAltResult>> {
        Ok(text
            .split_whitespace()
            .map(|w| Dynamic::from(w.to_string()))
            .collect())
    });

    module.set_native_fn("slug", |text: &str| -> Result<String, Box<EvalAltResult>> {
        let mut slug = String::with_capacity(text.len());
        for c in text.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.ends_with('-') && !slug.is_empty() {
                slug.push('-');
            }
        }
        Ok(slug.trim_end_matches('-').to_string())
    });

    module.set_native_fn(
        "pad_left",
        move |text: &str, width: INT| -> Result<String, Box<EvalAltResult>> {
            let width = usize::try_from(width).map_err(|_| invalid_arg("width must be >= 0"))?;
            if max_string_size > 0 && width > max_string_size {
                return Err(invalid_arg(&format!(
                    "width {} exceeds the maximum string size {}",
                    width, max_string_size
                )));
            }
            Ok(format!("{:>width$}", text, width = width))
        },
    );

    module
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_modules() -> Engine {
        let mut engine = Engine::new();
        let allow: Vec<String> = BUILTIN_MODULES.iter().map(|m| m.to_string()).collect();
        engine.set_module_resolver(module_resolver(&allow, 1024));
        engine
    }

    #[test]
    fn test_stats_module_mean_and_median() {
        let engine = engine_with_modules();
        let mean: FLOAT = engine
            .eval(r#"import "stats" as s; s::mean([1, 2, 3, 4])"#)
            .unwrap();
        assert_eq!(mean, 2.5);
        let median: FLOAT = engine
            .eval(r#"import "stats" as s; s::median([5, 1.0, 3])"#)
            .unwrap();
        assert_eq!(median, 3.0);
    }

    #[test]
    fn test_text_module_slug() {
        let engine = engine_with_modules();
        let slug: String = engine
            .eval(r#"import "text" as t; t::slug("Hello, World!")"#)
            .unwrap();
        assert_eq!(slug, "hello-world");
    }

    #[test]
    fn test_text_pad_left_respects_string_limit() {
        let engine = engine_with_modules();
        let padded: String = engine
            .eval(r#"import "text" as t; t::pad_left("7", 3)"#)
            .unwrap();
        assert_eq!(padded, "  7");

        let err = engine
            .eval::<String>(r#"import "text" as t; t::pad_left("x", 1 << 40)"#)
            .unwrap_err();
        assert!(err.to_string().contains("maximum string size"));
    }

    #[test]
    fn test_module_outside_allowlist_fails() {
        let mut engine = Engine::new();
        engine.set_module_resolver(module_resolver(&["stats".to_string()], 0));
        assert!(engine.eval::<Dynamic>(r#"import "text" as t; 1"#).is_err());
    }

    #[test]
    fn test_storage_functions_share_channel() {
        let storage = StorageChannel::new();
        let mut engine = Engine::new();
        register_storage(&mut engine, storage.clone());
        engine
            .run(r#"storage_set("seen", 3); storage_set("name", "x");"#)
            .unwrap();
        assert_eq!(storage.get_storage_keys(), vec!["name", "seen"]);
        let has: bool = engine.eval(r#"storage_has("seen")"#).unwrap();
        assert!(has);
    }
}
