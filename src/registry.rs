//! Schema registry and generic instantiator
//!
//! The registry owns every definition of a compiled unit, including the
//! synthetic definitions hoisted out of inline `{ ... }` field types.
//! Generic schemas are monomorphized on demand: `resolve("LengthPrefixed",
//! [Item])` substitutes `Item` for every `T` in the parsed body and caches
//! the result under `(name, args)`.
//!
//! Instantiation follows claim-then-compute-then-publish: the first caller
//! inserts an empty cell for the key under the write lock, then fills it
//! outside the lock. Racing callers get the same cell and block on it, so
//! each key is computed at most once and everyone observes the same `Arc`.

use once_cell::sync::OnceCell;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::ast::{
    FieldDefinition, SchemaDefinition, SchemaKind, Span, Terminator, TypeExpr, TypeVisitor,
};
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::error::SchemaError;

/// Default cap on distinct instantiations
pub const DEFAULT_MAX_INSTANTIATIONS: usize = 1024;

/// `(schemaName, orderedConcreteTypeArgs)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstantiationKey {
    pub name: String,
    pub args: Vec<TypeExpr>,
}

type InstanceCell = Arc<OnceCell<Arc<SchemaDefinition>>>;

/// Definitions of one compiled unit plus the instantiation cache
pub struct SchemaRegistry {
    definitions: HashMap<String, Arc<SchemaDefinition>>,
    /// Declaration order, hoisted schemas directly after their parent
    order: Vec<String>,
    instances: RwLock<HashMap<InstantiationKey, InstanceCell>>,
    /// Schemas and instances whose reachable graph has been validated
    checked: RwLock<HashSet<String>>,
    max_instantiations: usize,
    diagnostics: Vec<Diagnostic>,
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("schemas", &self.order)
            .field("instantiations", &self.instantiation_count())
            .finish()
    }
}

impl SchemaRegistry {
    /// Register parsed definitions, hoisting inline schemas
    pub fn new(definitions: Vec<SchemaDefinition>) -> Result<Self, SchemaError> {
        let mut taken = HashSet::new();
        for def in &definitions {
            if !taken.insert(def.name.clone()) {
                return Err(SchemaError::DuplicateSchema {
                    name: def.name.clone(),
                });
            }
        }

        let mut registry = Self {
            definitions: HashMap::new(),
            order: Vec::new(),
            instances: RwLock::new(HashMap::new()),
            checked: RwLock::new(HashSet::new()),
            max_instantiations: DEFAULT_MAX_INSTANTIATIONS,
            diagnostics: Vec::new(),
        };

        for mut def in definitions {
            let mut hoister = Hoister {
                kind: def.kind,
                params: def.type_params.clone(),
                taken: &mut taken,
                hoisted: Vec::new(),
                diagnostics: &mut registry.diagnostics,
            };
            def.fields = hoister.fields(&def.name, std::mem::take(&mut def.fields));
            let hoisted = std::mem::take(&mut hoister.hoisted);

            debug!(
                schema = %def.name,
                kind = %def.kind,
                generic = def.is_generic(),
                hoisted = hoisted.len(),
                "registered schema"
            );
            registry.insert(def);
            for inner in hoisted {
                registry.insert(inner);
            }
        }

        Ok(registry)
    }

    pub fn with_instantiation_limit(mut self, limit: usize) -> Self {
        self.max_instantiations = limit;
        self
    }

    fn insert(&mut self, def: SchemaDefinition) {
        self.order.push(def.name.clone());
        self.definitions.insert(def.name.clone(), Arc::new(def));
    }

    /// Parsed definition by name (generic definitions are returned as written)
    pub fn get(&self, name: &str) -> Option<&Arc<SchemaDefinition>> {
        self.definitions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Definitions in declaration order
    pub fn definitions(&self) -> impl Iterator<Item = &Arc<SchemaDefinition>> {
        self.order.iter().filter_map(|n| self.definitions.get(n))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Findings produced while registering
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn instantiation_count(&self) -> usize {
        self.instances
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    // ------------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------------

    /// Resolve `name<args>` to a concrete, parameter-free definition
    ///
    /// Everything reachable from the result is validated before it is
    /// returned, so a bad type argument fails here rather than mid-decode.
    pub fn resolve(&self, name: &str, args: &[TypeExpr]) -> Result<Arc<SchemaDefinition>, SchemaError> {
        let def = self.resolve_from(name, args, "<entry>", name)?;
        self.check_reachable(vec![Arc::clone(&def)])?;
        Ok(def)
    }

    /// Resolve a type written as a reference, e.g. the parsed `Box<Item>`
    pub fn resolve_type(&self, ty: &TypeExpr) -> Result<Arc<SchemaDefinition>, SchemaError> {
        match ty {
            TypeExpr::Reference { name, args } => self.resolve(name, args),
            other => Err(SchemaError::TypeMismatch {
                schema: "<entry>".to_string(),
                field: other.to_string(),
                reason: "entry point must name a schema".to_string(),
            }),
        }
    }

    /// Resolve a reference found in `schema.field`
    pub fn resolve_from(
        &self,
        name: &str,
        args: &[TypeExpr],
        schema: &str,
        field: &str,
    ) -> Result<Arc<SchemaDefinition>, SchemaError> {
        let def = self.lookup(name, args.len(), schema, field)?;
        if args.is_empty() {
            return Ok(Arc::clone(def));
        }

        if let Some(open) = args.iter().find(|a| !a.is_concrete()) {
            return Err(SchemaError::TypeMismatch {
                schema: schema.to_string(),
                field: field.to_string(),
                reason: format!("type argument '{}' of '{}' is not concrete", open, name),
            });
        }

        let key = InstantiationKey {
            name: name.to_string(),
            args: args.to_vec(),
        };
        if let Some(instance) = self.cached(&key) {
            return Ok(instance);
        }

        self.check_arguments(def.kind, args, schema, field)?;
        let cell = self.claim(&key)?;
        let instance = cell.get_or_init(|| Arc::new(instantiate(def, args)));
        Ok(Arc::clone(instance))
    }

    fn lookup(
        &self,
        name: &str,
        arity: usize,
        schema: &str,
        field: &str,
    ) -> Result<&Arc<SchemaDefinition>, SchemaError> {
        let def = self
            .definitions
            .get(name)
            .ok_or_else(|| SchemaError::UnresolvedReference {
                schema: schema.to_string(),
                field: field.to_string(),
                name: name.to_string(),
            })?;
        if def.type_params.len() != arity {
            return Err(SchemaError::ArityMismatch {
                schema: schema.to_string(),
                field: field.to_string(),
                name: name.to_string(),
                expected: def.type_params.len(),
                found: arity,
            });
        }
        Ok(def)
    }

    fn cached(&self, key: &InstantiationKey) -> Option<Arc<SchemaDefinition>> {
        self.instances
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .and_then(|cell| cell.get().cloned())
    }

    /// Type arguments must name known schemas of the generic's kind
    fn check_arguments(
        &self,
        kind: SchemaKind,
        args: &[TypeExpr],
        schema: &str,
        field: &str,
    ) -> Result<(), SchemaError> {
        let mismatch = |reason: String| SchemaError::TypeMismatch {
            schema: schema.to_string(),
            field: field.to_string(),
            reason,
        };

        for arg in args {
            if (kind == SchemaKind::Text && arg.is_binary_only())
                || (kind == SchemaKind::Binary && arg.is_text_only())
            {
                return Err(mismatch(format!(
                    "'{}' cannot be a type argument of a {} schema",
                    arg, kind
                )));
            }

            match arg {
                TypeExpr::Reference { name, args: inner } => {
                    let target = self.lookup(name, inner.len(), schema, field)?;
                    if target.kind != kind {
                        return Err(mismatch(format!(
                            "{} schema '{}' passed as a type argument of a {} schema",
                            target.kind, name, kind
                        )));
                    }
                    self.check_arguments(kind, inner, schema, field)?;
                }
                TypeExpr::FixedArray { element, .. }
                | TypeExpr::RepeatUntilArray { element, .. }
                | TypeExpr::TextRepeat { element, .. } => {
                    self.check_arguments(kind, std::slice::from_ref(element.as_ref()), schema, field)?;
                }
                TypeExpr::InlineSchema(fields) => {
                    for inner in fields {
                        self.check_arguments(kind, std::slice::from_ref(&inner.ty), schema, field)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Find or insert the cell for a key
    fn claim(&self, key: &InstantiationKey) -> Result<InstanceCell, SchemaError> {
        if let Some(cell) = self
            .instances
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
        {
            return Ok(Arc::clone(cell));
        }

        let mut instances = self.instances.write().unwrap_or_else(|e| e.into_inner());
        if let Some(cell) = instances.get(key) {
            return Ok(Arc::clone(cell));
        }
        if instances.len() >= self.max_instantiations {
            return Err(SchemaError::InstantiationLimit {
                name: instance_name(&key.name, &key.args),
                limit: self.max_instantiations,
            });
        }
        let cell = InstanceCell::default();
        instances.insert(key.clone(), Arc::clone(&cell));
        Ok(cell)
    }

    // ------------------------------------------------------------------------
    // Eager validation
    // ------------------------------------------------------------------------

    /// Check every definition, then every instantiation reachable from a
    /// non-generic schema
    pub fn validate(&self) -> Result<(), SchemaError> {
        for def in self.definitions() {
            self.check_definition(def)?;
        }

        let roots: Vec<Arc<SchemaDefinition>> = self
            .definitions()
            .filter(|d| !d.is_generic())
            .cloned()
            .collect();
        self.check_reachable(roots)?;

        debug!(
            schemas = self.len(),
            instantiations = self.instantiation_count(),
            "validated schema registry"
        );
        Ok(())
    }

    /// Resolve every reference reachable from `roots`, checking each new instance
    fn check_reachable(&self, roots: Vec<Arc<SchemaDefinition>>) -> Result<(), SchemaError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut work = roots;

        while let Some(def) = work.pop() {
            if self.is_checked(&def.name) || !seen.insert(def.name.clone()) {
                continue;
            }
            if !self.contains(&def.name) {
                self.check_definition(&def)?;
            }

            for field in &def.fields {
                let mut refs = References(Vec::new());
                refs.visit_type(&field.ty);
                for (name, args) in refs.0 {
                    let target = self.resolve_from(&name, &args, &def.name, &field.name)?;
                    if !seen.contains(&target.name) {
                        work.push(target);
                    }
                }
            }
        }

        self.checked
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .extend(seen);
        Ok(())
    }

    fn is_checked(&self, name: &str) -> bool {
        self.checked
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(name)
    }

    fn check_definition(&self, def: &SchemaDefinition) -> Result<(), SchemaError> {
        for field in &def.fields {
            self.check_type(def, field, &field.ty)?;
        }
        Ok(())
    }

    fn check_type(
        &self,
        def: &SchemaDefinition,
        field: &FieldDefinition,
        ty: &TypeExpr,
    ) -> Result<(), SchemaError> {
        let mismatch = |reason: String| SchemaError::TypeMismatch {
            schema: def.name.clone(),
            field: field.name.clone(),
            reason,
        };

        if def.kind == SchemaKind::Text && ty.is_binary_only() {
            return Err(mismatch(format!("'{}' cannot appear in a text schema", ty)));
        }
        if def.kind == SchemaKind::Binary && ty.is_text_only() {
            return Err(mismatch(format!("'{}' cannot appear in a binary schema", ty)));
        }

        match ty {
            TypeExpr::Reference { name, args } => {
                let target = self.lookup(name, args.len(), &def.name, &field.name)?;
                if target.kind != def.kind {
                    return Err(mismatch(format!(
                        "{} schema '{}' referenced from {} schema",
                        target.kind, name, def.kind
                    )));
                }
                for arg in args {
                    self.check_type(def, field, arg)?;
                }
            }
            TypeExpr::InlineSchema(fields) => {
                for inner in fields {
                    self.check_type(def, inner, &inner.ty)?;
                }
            }
            TypeExpr::FixedArray { element, .. } => self.check_type(def, field, element)?,
            TypeExpr::RepeatUntilArray { element, until } | TypeExpr::TextRepeat { element, until } => {
                check_loop_condition(def, field, until)?;
                self.check_type(def, field, element)?;
            }
            _ => {}
        }
        Ok(())
    }
}

/// A loop condition may only look back at its own array from the end
fn check_loop_condition(
    def: &SchemaDefinition,
    field: &FieldDefinition,
    until: &Terminator,
) -> Result<(), SchemaError> {
    let Terminator::Condition(cond) = until else {
        return Ok(());
    };
    let Some(root) = cond.path().and_then(|p| p.root()) else {
        return Ok(());
    };
    match root.index {
        Some(i) if root.name == field.name && i >= 0 => Err(SchemaError::InvalidLoopCondition {
            schema: def.name.clone(),
            field: field.name.clone(),
            array: root.name.clone(),
            condition: cond.to_string(),
        }),
        _ => Ok(()),
    }
}

struct References(Vec<(String, Vec<TypeExpr>)>);

impl TypeVisitor for References {
    fn visit_reference(&mut self, name: &str, args: &[TypeExpr]) {
        self.0.push((name.to_string(), args.to_vec()));
    }
}

// ============================================================================
// Monomorphization
// ============================================================================

fn instance_name(name: &str, args: &[TypeExpr]) -> String {
    TypeExpr::Reference {
        name: name.to_string(),
        args: args.to_vec(),
    }
    .to_string()
}

fn instantiate(def: &SchemaDefinition, args: &[TypeExpr]) -> SchemaDefinition {
    let bindings: HashMap<&str, &TypeExpr> = def
        .type_params
        .iter()
        .map(String::as_str)
        .zip(args.iter())
        .collect();

    let name = instance_name(&def.name, args);
    debug!(generic = %def.name, instance = %name, "instantiating generic schema");

    SchemaDefinition {
        kind: def.kind,
        name,
        type_params: Vec::new(),
        fields: substitute_fields(&def.fields, &bindings),
        span: def.span,
    }
}

fn substitute_fields(
    fields: &[FieldDefinition],
    bindings: &HashMap<&str, &TypeExpr>,
) -> Vec<FieldDefinition> {
    fields
        .iter()
        .map(|f| FieldDefinition {
            name: f.name.clone(),
            ty: substitute(&f.ty, bindings),
            span: f.span,
        })
        .collect()
}

/// Replace type parameters structurally
pub fn substitute(ty: &TypeExpr, bindings: &HashMap<&str, &TypeExpr>) -> TypeExpr {
    match ty {
        TypeExpr::Param(p) => match bindings.get(p.as_str()) {
            Some(arg) => (*arg).clone(),
            None => ty.clone(),
        },
        TypeExpr::Reference { name, args } => TypeExpr::Reference {
            name: name.clone(),
            args: args.iter().map(|a| substitute(a, bindings)).collect(),
        },
        TypeExpr::InlineSchema(fields) => TypeExpr::InlineSchema(substitute_fields(fields, bindings)),
        TypeExpr::FixedArray { element, count } => TypeExpr::FixedArray {
            element: Box::new(substitute(element, bindings)),
            count: count.clone(),
        },
        TypeExpr::RepeatUntilArray { element, until } => TypeExpr::RepeatUntilArray {
            element: Box::new(substitute(element, bindings)),
            until: until.clone(),
        },
        TypeExpr::TextRepeat { element, until } => TypeExpr::TextRepeat {
            element: Box::new(substitute(element, bindings)),
            until: until.clone(),
        },
        other => other.clone(),
    }
}

// ============================================================================
// Inline schema hoisting
// ============================================================================

struct Hoister<'r> {
    kind: SchemaKind,
    params: Vec<String>,
    taken: &'r mut HashSet<String>,
    hoisted: Vec<SchemaDefinition>,
    diagnostics: &'r mut Vec<Diagnostic>,
}

impl Hoister<'_> {
    fn fields(&mut self, parent: &str, fields: Vec<FieldDefinition>) -> Vec<FieldDefinition> {
        fields
            .into_iter()
            .map(|f| {
                let ty = self.hoist(parent, &f.name, f.span, f.ty);
                FieldDefinition {
                    name: f.name,
                    ty,
                    span: f.span,
                }
            })
            .collect()
    }

    fn hoist(&mut self, parent: &str, field: &str, span: Span, ty: TypeExpr) -> TypeExpr {
        match ty {
            TypeExpr::InlineSchema(inner) => {
                let name = self.unique_name(&format!("{}.{}", parent, field));
                let fields = self.fields(&name, inner);

                debug!(schema = %name, "hoisted inline schema");
                self.diagnostics.push(Diagnostic::info(
                    DiagnosticCode::InlineSchemaHoisted,
                    format!("inline schema of {}.{} registered as '{}'", parent, field, name),
                ));

                self.hoisted.push(SchemaDefinition {
                    kind: self.kind,
                    name: name.clone(),
                    type_params: self.params.clone(),
                    fields,
                    span,
                });
                TypeExpr::Reference {
                    name,
                    args: self.params.iter().cloned().map(TypeExpr::Param).collect(),
                }
            }
            TypeExpr::Reference { name, args } => TypeExpr::Reference {
                name,
                args: args.into_iter().map(|a| self.hoist(parent, field, span, a)).collect(),
            },
            TypeExpr::FixedArray { element, count } => TypeExpr::FixedArray {
                element: Box::new(self.hoist(parent, field, span, *element)),
                count,
            },
            TypeExpr::RepeatUntilArray { element, until } => TypeExpr::RepeatUntilArray {
                element: Box::new(self.hoist(parent, field, span, *element)),
                until,
            },
            TypeExpr::TextRepeat { element, until } => TypeExpr::TextRepeat {
                element: Box::new(self.hoist(parent, field, span, *element)),
                until,
            },
            other => other,
        }
    }

    fn unique_name(&mut self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut n = 2;
        while !self.taken.insert(candidate.clone()) {
            candidate = format!("{}#{}", base, n);
            n += 1;
        }
        candidate
    }
}
