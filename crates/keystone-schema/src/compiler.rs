//! Memoized compilation of node classes.
//!
//! Compiling a class merges its declarations with everything it inherits.
//! Results are cached per class identity, so every caller receives the same
//! `Arc<CompiledType>` and schema assembly can dedupe by pointer.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use keystone_core::{KeystoneError, Result};

use crate::class::{ClassRef, NodeClass};
use crate::compiled::{CompiledField, CompiledMutation, CompiledType, MutationKind};
use crate::spec::{ArgSpec, CreatedBy, CustomMutation, FieldSpec, NodeSpec, ScalarKind};

#[derive(Default)]
pub struct Compiler {
    specs: RwLock<HashMap<TypeId, Arc<NodeSpec>>>,
    types: RwLock<HashMap<TypeId, Arc<CompiledType>>>,
}

/// Compile `T` with the process-wide compiler.
pub fn compile<T: NodeClass>() -> Result<Arc<CompiledType>> {
    Compiler::global().compile(ClassRef::of::<T>())
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static Compiler {
        static GLOBAL: OnceLock<Compiler> = OnceLock::new();
        GLOBAL.get_or_init(Compiler::new)
    }

    /// The class's own declarations, built once.
    pub fn spec_of(&self, class: ClassRef) -> Arc<NodeSpec> {
        if let Some(spec) = self.specs.read().get(&class.id()) {
            return Arc::clone(spec);
        }
        let spec = Arc::new(NodeSpec::declare(class));
        Arc::clone(self.specs.write().entry(class.id()).or_insert(spec))
    }

    pub fn compile_class<T: NodeClass>(&self) -> Result<Arc<CompiledType>> {
        self.compile(ClassRef::of::<T>())
    }

    pub fn compile(&self, class: ClassRef) -> Result<Arc<CompiledType>> {
        self.compile_with_stack(class, &mut Vec::new())
    }

    pub fn is_compiled(&self, class: ClassRef) -> bool {
        self.types.read().contains_key(&class.id())
    }

    fn compile_with_stack(
        &self,
        class: ClassRef,
        stack: &mut Vec<ClassRef>,
    ) -> Result<Arc<CompiledType>> {
        if let Some(compiled) = self.types.read().get(&class.id()) {
            return Ok(Arc::clone(compiled));
        }
        if stack.contains(&class) {
            let chain: Vec<&str> = stack
                .iter()
                .chain(std::iter::once(&class))
                .map(|c| c.name())
                .collect();
            return Err(KeystoneError::SpecValidation(format!(
                "inheritance cycle: {}",
                chain.join(" -> ")
            )));
        }

        let spec = self.spec_of(class);
        if !spec.errors.is_empty() {
            return Err(KeystoneError::SpecValidation(spec.errors.join("; ")));
        }

        let parent = match class.parent() {
            Some(parent) => {
                stack.push(class);
                let compiled = self.compile_with_stack(parent, stack);
                stack.pop();
                Some(compiled?)
            }
            None => None,
        };

        let compiled = Arc::new(build_type(class, &spec, parent, self)?);
        tracing::debug!(
            type_name = compiled.name,
            fields = compiled.fields.len(),
            relations = compiled.relations.len(),
            mutations = compiled.mutations.len(),
            "Compiled node type"
        );
        Ok(Arc::clone(
            self.types.write().entry(class.id()).or_insert(compiled),
        ))
    }
}

// ── Merging ──────────────────────────────────────────────────────

fn build_type(
    class: ClassRef,
    spec: &NodeSpec,
    parent: Option<Arc<CompiledType>>,
    compiler: &Compiler,
) -> Result<CompiledType> {
    let name = class.name();
    let (mut fields, mut relations, interfaces) = match &parent {
        Some(p) => {
            let mut interfaces = vec![p.name];
            interfaces.extend(p.interfaces.iter().copied());
            (p.fields.clone(), p.relations.clone(), interfaces)
        }
        None => (vec![id_field(name)], Vec::new(), Vec::new()),
    };

    for field in &spec.fields {
        if relations.iter().any(|r| r.name == field.name) {
            return Err(KeystoneError::SpecValidation(format!(
                "{name}: field \"{}\" redeclares an inherited relation",
                field.name
            )));
        }
        let mut compiled = CompiledField {
            spec: field.clone(),
            declared_by: name,
            enum_scope: name,
        };
        match fields.iter_mut().find(|f| f.name() == field.name) {
            Some(inherited) if inherited.spec.kind != field.kind => {
                return Err(KeystoneError::SpecValidation(format!(
                    "{name}: field \"{}\" changes kind from {} to {}",
                    field.name, inherited.spec.kind, field.kind
                )));
            }
            Some(inherited) if inherited.spec.enum_values != field.enum_values => {
                return Err(KeystoneError::SpecValidation(format!(
                    "{name}: enum field \"{}\" changes its members",
                    field.name
                )));
            }
            Some(inherited) => {
                compiled.enum_scope = inherited.enum_scope;
                *inherited = compiled;
            }
            None => fields.push(compiled),
        }
    }

    for relation in &spec.relations {
        if fields.iter().any(|f| f.name() == relation.name) {
            return Err(KeystoneError::SpecValidation(format!(
                "{name}: relation \"{}\" redeclares an inherited field",
                relation.name
            )));
        }
        match relations.iter_mut().find(|r| r.name == relation.name) {
            Some(inherited) => *inherited = relation.clone(),
            None => relations.push(relation.clone()),
        }
    }

    let lineage = lineage_specs(class, compiler);
    let mutations = build_mutations(class, &fields, &lineage)?;

    Ok(CompiledType {
        name,
        class,
        parent,
        interfaces,
        fields,
        relations,
        mutations,
        access: class.access(),
        is_abstract: class.is_abstract(),
    })
}

fn id_field(declared_by: &'static str) -> CompiledField {
    CompiledField {
        spec: FieldSpec {
            name: "id".to_string(),
            kind: ScalarKind::Id,
            nullable: false,
            enum_values: Vec::new(),
            args: Vec::new(),
            resolver: None,
        },
        declared_by,
        enum_scope: declared_by,
    }
}

/// Specs from `class` up through its ancestors, nearest first. Only called
/// after the parent chain compiled, so it is acyclic.
fn lineage_specs(class: ClassRef, compiler: &Compiler) -> Vec<Arc<NodeSpec>> {
    let mut lineage = Vec::new();
    let mut current = Some(class);
    while let Some(c) = current {
        lineage.push(compiler.spec_of(c));
        current = c.parent();
    }
    lineage
}

fn build_mutations(
    class: ClassRef,
    fields: &[CompiledField],
    lineage: &[Arc<NodeSpec>],
) -> Result<Vec<CompiledMutation>> {
    let name = class.name();
    let mut mutations = Vec::new();

    if !class.is_abstract() {
        let created_by: Option<CreatedBy> =
            lineage.iter().find_map(|s| s.mutations.created_by.clone());
        let stored: Vec<&CompiledField> = fields
            .iter()
            .filter(|f| f.name() != "id" && !f.is_computed())
            .collect();

        let mut create_args: Vec<ArgSpec> = stored
            .iter()
            .map(|f| ArgSpec {
                name: f.spec.name.clone(),
                kind: f.spec.kind,
                nullable: f.spec.nullable,
            })
            .collect();
        if created_by.is_some() {
            create_args.push(ArgSpec::required("parentId", ScalarKind::Id));
        }
        let mut update_args = vec![ArgSpec::required("id", ScalarKind::Id)];
        update_args.extend(stored.iter().map(|f| ArgSpec::new(f.spec.name.clone(), f.spec.kind)));

        mutations.push(CompiledMutation {
            name: format!("create{name}"),
            kind: MutationKind::Create,
            args: create_args,
            handler: lineage.iter().find_map(|s| s.mutations.create.clone()),
            created_by,
        });
        mutations.push(CompiledMutation {
            name: format!("update{name}"),
            kind: MutationKind::Update,
            args: update_args,
            handler: lineage.iter().find_map(|s| s.mutations.update.clone()),
            created_by: None,
        });
        mutations.push(CompiledMutation {
            name: format!("delete{name}"),
            kind: MutationKind::Delete,
            args: vec![ArgSpec::required("id", ScalarKind::Id)],
            handler: lineage.iter().find_map(|s| s.mutations.delete.clone()),
            created_by: None,
        });
    }

    // Ancestors first; a nearer class redeclaring a custom replaces it.
    let mut customs: Vec<&CustomMutation> = Vec::new();
    for spec in lineage.iter().rev() {
        for custom in &spec.mutations.customs {
            match customs.iter_mut().find(|c| c.name == custom.name) {
                Some(slot) => *slot = custom,
                None => customs.push(custom),
            }
        }
    }
    for custom in customs {
        let full_name = format!("{}{name}", custom.name);
        if mutations.iter().any(|m: &CompiledMutation| m.name == full_name) {
            return Err(KeystoneError::SpecValidation(format!(
                "{name}: mutation \"{full_name}\" is declared more than once"
            )));
        }
        mutations.push(CompiledMutation {
            name: full_name,
            kind: MutationKind::Custom,
            args: custom.args.clone(),
            handler: Some(custom.handler.clone()),
            created_by: None,
        });
    }

    Ok(mutations)
}
