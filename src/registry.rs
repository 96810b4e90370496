use rustc_hash::FxHashMap;
use tracing::{debug, trace};

mod value;

pub use value::Value;

pub const PRIM_BOOL: &str = "PRIM_BOOL";
pub const PRIM_STRING: &str = "PRIM_STRING";
pub const PRIM_INT: &str = "PRIM_INT";
pub const PRIM_REAL: &str = "PRIM_REAL";
const PRIMITIVES: [&str; 4] = [PRIM_BOOL, PRIM_STRING, PRIM_INT, PRIM_REAL];

/// Handle to a variable slot. Slots outlive the scope that declared them,
/// so ids held by compiled statements never dangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub type_name: String,
    pub values: Vec<Value>,
    pub temporary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TypeKind {
    Primitive,
    /// Placeholder for a variable declared without a type.
    Internal,
    /// Declared type with no base.
    Opaque,
    Alias(String),
}

#[derive(Debug, Clone, Default)]
struct Scope {
    variables: Vec<String>,
    types: Vec<String>,
}

/// Variables and types visible to a running program.
#[derive(Debug, Clone)]
pub struct Registry {
    variables: Vec<Variable>,
    by_name: FxHashMap<String, VarId>,
    types: FxHashMap<String, TypeKind>,
    scopes: Vec<Scope>,
    internal_count: usize,
    temporary_count: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let types = PRIMITIVES
            .iter()
            .map(|name| (name.to_string(), TypeKind::Primitive))
            .collect();
        Self {
            variables: Vec::new(),
            by_name: FxHashMap::default(),
            types,
            scopes: vec![Scope::default()],
            internal_count: 0,
            temporary_count: 0,
        }
    }

    /// Resets everything but the primitive types.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn is_primitive(&self, name: &str) -> bool {
        self.types.get(name) == Some(&TypeKind::Primitive)
    }

    pub fn add_type(&mut self, name: &str) -> bool {
        if self.types.contains_key(name) {
            return false;
        }
        self.insert_type(name, TypeKind::Opaque);
        true
    }

    /// Declares `name` as another name for `base`.
    pub fn add_typedef(&mut self, name: &str, base: &str) -> bool {
        if self.types.contains_key(name)
            || !self.types.contains_key(base)
            || self.lowest_type(base) == name
        {
            return false;
        }
        self.insert_type(name, TypeKind::Alias(base.to_string()));
        debug!(name, base, "typedef registered");
        true
    }

    /// Follows typedefs down to the type they finally name.
    pub fn lowest_type(&self, name: &str) -> String {
        let mut current = name;
        for _ in 0..=self.types.len() {
            match self.types.get(current) {
                Some(TypeKind::Alias(base)) => current = base,
                _ => break,
            }
        }
        current.to_string()
    }

    /// Adds a variable with `size` slots. Without a type the variable gets a
    /// fresh internal type and holds whatever value is stored into it.
    pub fn add_variable(&mut self, name: &str, type_name: Option<&str>, size: usize) -> bool {
        if self.by_name.contains_key(name) {
            return false;
        }
        let type_name = match type_name {
            Some(type_name) if self.types.contains_key(type_name) => type_name.to_string(),
            Some(type_name) => {
                debug!(name, type_name, "variable of unknown type rejected");
                return false;
            }
            None => self.new_internal_type(),
        };
        let lowest = self.lowest_type(&type_name);
        let variable = Variable {
            name: name.to_string(),
            values: vec![Value::default_for(&lowest); size.max(1)],
            type_name,
            temporary: false,
        };
        debug!(name, type_name = %variable.type_name, size, "variable added");
        self.variables.push(variable);
        let id = VarId(self.variables.len() - 1);
        self.by_name.insert(name.to_string(), id);
        self.current_scope().variables.push(name.to_string());
        true
    }

    /// Fresh `temp#n` variable for intermediate results.
    pub fn add_temporary(&mut self) -> VarId {
        loop {
            let name = format!("temp#{}", self.temporary_count);
            self.temporary_count += 1;
            if self.add_variable(&name, None, 1)
                && let Some(id) = self.id_of(&name)
            {
                self.variables[id.0].temporary = true;
                return id;
            }
        }
    }

    pub fn temporary_count(&self) -> usize {
        self.temporary_count
    }

    pub fn id_of(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }

    /// Looks a variable up by name, declaring it with an unknown type first
    /// when it does not exist yet.
    pub fn ensure_variable(&mut self, name: &str) -> Option<VarId> {
        if self.id_of(name).is_none() {
            self.add_variable(name, None, 1);
        }
        self.id_of(name)
    }

    pub fn get_variable(&self, name: &str) -> Option<&Variable> {
        self.id_of(name).and_then(|id| self.variable(id))
    }

    pub fn variable(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id.0)
    }

    pub fn value(&self, id: VarId, index: usize) -> Option<&Value> {
        self.variable(id)?.values.get(index)
    }

    pub fn set_variable(&mut self, name: &str, value: Value, index: usize) -> bool {
        match self.ensure_variable(name) {
            Some(id) => self.set_value(id, value, index),
            None => false,
        }
    }

    /// Stores `value` converted to the variable's lowest type, growing an
    /// array with zero values when `index` is past its end. Untyped
    /// variables store the value unchanged.
    pub fn set_value(&mut self, id: VarId, value: Value, index: usize) -> bool {
        let Some(type_name) = self.variable(id).map(|variable| variable.type_name.clone()) else {
            return false;
        };
        let lowest = self.lowest_type(&type_name);
        let Some(converted) = value.convert_to(&lowest) else {
            debug!(id = id.0, %value, %lowest, "value does not convert");
            return false;
        };

        let variable = &mut self.variables[id.0];
        if variable.values.len() <= index {
            variable.values.resize(index + 1, Value::default_for(&lowest));
        }
        trace!(name = %variable.name, index, value = %converted, "store");
        variable.values[index] = converted;
        true
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(Scope::default());
        debug!(depth = self.scopes.len(), "scope entered");
    }

    /// Drops the names declared in the innermost scope. The global scope
    /// cannot be exited.
    pub fn exit_scope(&mut self) -> bool {
        if self.scopes.len() == 1 {
            return false;
        }
        let Some(scope) = self.scopes.pop() else {
            return false;
        };
        for name in &scope.variables {
            self.by_name.remove(name);
        }
        for name in &scope.types {
            self.types.remove(name);
        }
        debug!(
            depth = self.scopes.len(),
            variables = scope.variables.len(),
            "scope exited"
        );
        true
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Converts every stored value to its variable's lowest type. Returns
    /// false when some value could not be converted; that value is kept.
    pub fn verify_types(&mut self) -> bool {
        let mut consistent = true;
        for id in self.by_name.values().copied().collect::<Vec<_>>() {
            let lowest = self.lowest_type(&self.variables[id.0].type_name);
            if !self.is_primitive(&lowest) {
                continue;
            }
            for slot in &mut self.variables[id.0].values {
                match slot.convert_to(&lowest) {
                    Some(converted) => *slot = converted,
                    None => consistent = false,
                }
            }
        }
        consistent
    }

    /// Type shown for a variable: its lowest type, or for an untyped
    /// variable the type of the value in its first slot.
    pub fn effective_type(&self, variable: &Variable) -> String {
        let lowest = self.lowest_type(&variable.type_name);
        match (self.types.get(&lowest), variable.values.first()) {
            (Some(TypeKind::Internal), Some(value)) => value.type_name().to_string(),
            _ => lowest,
        }
    }

    /// One line per visible variable, in declaration order.
    pub fn describe_types(&self) -> Vec<String> {
        let mut visible: Vec<VarId> = self.by_name.values().copied().collect();
        visible.sort_by_key(|id| id.0);
        visible
            .into_iter()
            .filter_map(|id| self.variable(id))
            .map(|variable| {
                let values = variable
                    .values
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "{} : {} = {}",
                    variable.name,
                    self.effective_type(variable),
                    values
                )
            })
            .collect()
    }

    fn new_internal_type(&mut self) -> String {
        let name = format!("INTERNAL_{}", self.internal_count);
        self.internal_count += 1;
        self.insert_type(&name, TypeKind::Internal);
        name
    }

    fn insert_type(&mut self, name: &str, kind: TypeKind) {
        self.types.insert(name.to_string(), kind);
        self.current_scope().types.push(name.to_string());
    }

    fn current_scope(&mut self) -> &mut Scope {
        if self.scopes.is_empty() {
            self.scopes.push(Scope::default());
        }
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_exist_and_survive_clear() {
        let mut registry = Registry::new();
        assert!(registry.add_variable("x", Some(PRIM_INT), 1));
        registry.clear();
        assert!(registry.get_variable("x").is_none());
        for primitive in PRIMITIVES {
            assert!(registry.is_primitive(primitive));
        }
    }

    #[test]
    fn untyped_variable_keeps_the_stored_value_type() {
        let mut registry = Registry::new();
        assert!(registry.set_variable("x", Value::Int(3), 0));
        let type_name = registry.get_variable("x").expect("x").type_name.clone();
        assert!(type_name.starts_with("INTERNAL_"));
        assert_eq!(registry.lowest_type(&type_name), type_name);

        assert!(registry.set_variable("x", Value::Real(2.7), 0));
        assert_eq!(registry.get_variable("x").expect("x").values, vec![Value::Real(2.7)]);
        assert!(registry.set_variable("x", Value::Int(1), 0));
        assert_eq!(registry.get_variable("x").expect("x").values, vec![Value::Int(1)]);
        assert!(registry.set_variable("x", Value::Str("six".into()), 0));
        assert_eq!(registry.describe_types(), vec!["x : PRIM_STRING = six"]);
    }

    #[test]
    fn temporaries_take_any_numeric_kind() {
        let mut registry = Registry::new();
        let temp = registry.add_temporary();
        assert!(registry.set_value(temp, Value::Int(1), 0));
        assert!(registry.set_value(temp, Value::Real(1.5), 0));
        assert_eq!(registry.value(temp, 0), Some(&Value::Real(1.5)));
    }

    #[test]
    fn typedef_chains_resolve_to_the_lowest_type() {
        let mut registry = Registry::new();
        assert!(registry.add_typedef("meters", PRIM_REAL));
        assert!(registry.add_typedef("distance", "meters"));
        assert!(!registry.add_typedef("meters", PRIM_INT));
        assert!(!registry.add_typedef("loop", "loop"));
        assert_eq!(registry.lowest_type("distance"), PRIM_REAL);

        assert!(registry.add_variable("d", Some("distance"), 1));
        assert!(registry.set_variable("d", Value::Int(4), 0));
        assert_eq!(
            registry.get_variable("d").expect("d").values,
            vec![Value::Real(4.0)]
        );
    }

    #[test]
    fn rejects_unknown_types_and_duplicates() {
        let mut registry = Registry::new();
        assert!(!registry.add_variable("x", Some("unknown"), 1));
        assert!(registry.add_variable("x", Some(PRIM_INT), 1));
        assert!(!registry.add_variable("x", Some(PRIM_INT), 1));
        assert!(registry.add_type("point"));
        assert!(!registry.add_type("point"));
    }

    #[test]
    fn arrays_grow_with_zero_values() {
        let mut registry = Registry::new();
        assert!(registry.add_variable("a", Some(PRIM_INT), 2));
        assert!(registry.set_variable("a", Value::Int(9), 4));
        let values = &registry.get_variable("a").expect("a").values;
        assert_eq!(values.len(), 5);
        assert_eq!(values[2], Value::Int(0));
        assert_eq!(values[4], Value::Int(9));
    }

    #[test]
    fn string_variable_rejects_nothing_numeric_rejects_text() {
        let mut registry = Registry::new();
        registry.add_variable("s", Some(PRIM_STRING), 1);
        registry.add_variable("n", Some(PRIM_INT), 1);
        assert!(registry.set_variable("s", Value::Int(5), 0));
        assert!(!registry.set_variable("n", Value::Str("five".into()), 0));
        assert_eq!(registry.get_variable("s").expect("s").values[0], Value::Str("5".into()));
    }

    #[test]
    fn exiting_a_scope_drops_its_names() {
        let mut registry = Registry::new();
        registry.add_variable("outer", Some(PRIM_INT), 1);
        registry.enter_scope();
        registry.add_variable("inner", Some(PRIM_INT), 1);
        registry.add_typedef("local", PRIM_INT);
        assert!(registry.exit_scope());

        assert!(registry.get_variable("outer").is_some());
        assert!(registry.get_variable("inner").is_none());
        assert!(!registry.has_type("local"));
        assert!(!registry.exit_scope());
    }

    #[test]
    fn temporaries_are_counted() {
        let mut registry = Registry::new();
        let first = registry.add_temporary();
        let second = registry.add_temporary();
        assert_ne!(first, second);
        assert_eq!(registry.temporary_count(), 2);
        assert_eq!(registry.variable(first).map(|v| v.name.as_str()), Some("temp#0"));
        assert!(registry.variable(second).is_some_and(|v| v.temporary));
    }

    #[test]
    fn verify_types_converts_stored_values() {
        let mut registry = Registry::new();
        registry.add_variable("x", None, 1);
        registry.set_variable("x", Value::Real(1.5), 0);
        assert!(registry.verify_types());
        assert_eq!(registry.describe_types(), vec!["x : PRIM_REAL = 1.5"]);
    }
}
