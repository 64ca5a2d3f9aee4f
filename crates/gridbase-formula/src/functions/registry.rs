use std::sync::Arc;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::FunctionDef;
use super::defs;

/// Explicit registry of callable functions, built once and passed by
/// reference. The internal `subquery` and `join_lookup` definitions are kept
/// at hand because the typing pass inserts calls to them itself.
pub struct FunctionRegistry {
    functions: FxHashMap<SmolStr, Arc<dyn FunctionDef>>,
    subquery: Arc<dyn FunctionDef>,
    join_lookup: Arc<dyn FunctionDef>,
}

impl FunctionRegistry {
    pub fn standard() -> Self {
        let mut functions: FxHashMap<SmolStr, Arc<dyn FunctionDef>> = FxHashMap::default();
        let mut subquery = None;
        let mut join_lookup = None;

        for def in defs::builtins() {
            let def: Arc<dyn FunctionDef> = Arc::new(def);
            match def.name() {
                "subquery" => subquery = Some(Arc::clone(&def)),
                "join_lookup" => join_lookup = Some(Arc::clone(&def)),
                _ => {}
            }
            functions.insert(SmolStr::new(def.name()), def);
        }

        Self {
            functions,
            subquery: subquery.expect("standard builtins always include subquery"),
            join_lookup: join_lookup.expect("standard builtins always include join_lookup"),
        }
    }

    pub fn register(&mut self, def: Arc<dyn FunctionDef>) {
        self.functions.insert(SmolStr::new(def.name()), def);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn FunctionDef>> {
        self.functions.get(name).cloned()
    }

    pub fn subquery(&self) -> Arc<dyn FunctionDef> {
        Arc::clone(&self.subquery)
    }

    pub fn join_lookup(&self) -> Arc<dyn FunctionDef> {
        Arc::clone(&self.join_lookup)
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
