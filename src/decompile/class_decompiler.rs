use std::collections::BTreeMap;
use std::fmt::Write;
use std::thread;
use std::time::Duration;

use crate::attribute_info::{AttributeInfoVariant, BootstrapMethod, CodeAttribute};
use crate::constant_info::ConstantPool;
use crate::error::{ClassFormatError, DecompileError, MethodError};
use crate::method_info::{MethodAccessFlags, MethodInfo};
use crate::parse_class;
use crate::types::ClassFile;

use super::accessors::AccessorTable;
use super::bytecode_writer::write_method_bytecode;
use super::cfg::build_cfg;
use super::desugar::{collect_switch_maps, desugar_class, DesugarOptions, SwitchMaps};
use super::finalizer::finalize_class;
use super::java_ast::*;
use super::renderer::{JavaRenderer, RenderConfig, RenderedSource};
use super::stack_sim::{simulate_method, MethodContext};
use super::structured_types::{StructuredBody, StructuredStmt};
use super::structuring::structure_method;
use super::type_inference::{build_java_class, inner_class_entries, resolve_class_types};
use super::util::Budget;

/// Nesting depth past which family members are no longer attached.
const MAX_NESTING: usize = 16;

/// Options controlling the decompilation process.
#[derive(Clone, Debug)]
pub struct DecompileOptions {
    pub render_config: RenderConfig,
    pub include_synthetic: bool,
    pub desugar_enum_switch: bool,
    pub desugar_string_switch: bool,
    pub desugar_foreach: bool,
    pub desugar_assert: bool,
    pub desugar_autobox: bool,
    /// Replace `access$NNN` calls with the member they forward to.
    pub eliminate_accessors: bool,
    /// Structuring steps a single method may take before it falls back to a listing.
    pub method_step_budget: u64,
    pub method_timeout: Option<Duration>,
    /// Reconstruct the methods of one class on scoped worker threads.
    pub parallel_methods: bool,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        Self {
            render_config: RenderConfig::default(),
            include_synthetic: false,
            desugar_enum_switch: true,
            desugar_string_switch: true,
            desugar_foreach: true,
            desugar_assert: true,
            desugar_autobox: true,
            eliminate_accessors: true,
            method_step_budget: 200_000,
            method_timeout: Some(Duration::from_secs(10)),
            parallel_methods: false,
        }
    }
}

/// Name to class file lookup over the classes compiled from one source file.
pub trait ClassLookup {
    fn lookup(&self, internal_name: &str) -> Option<&ClassFile>;
}

/// An outer class and its nested classes, keyed by internal name.
#[derive(Clone, Debug, Default)]
pub struct ClassFamily {
    classes: BTreeMap<String, ClassFile>,
}

impl ClassFamily {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `class`, replacing and returning an earlier class of the same name.
    pub fn insert(&mut self, class: ClassFile) -> Option<ClassFile> {
        self.classes.insert(class.this_class_name().to_string(), class)
    }

    /// Loads `bytes` into the family and returns the class's internal name.
    pub fn add_bytes(&mut self, bytes: &[u8]) -> Result<String, ClassFormatError> {
        let class = parse_class(bytes)?;
        let name = class.this_class_name().to_string();
        self.classes.insert(name.clone(), class);
        Ok(name)
    }

    pub fn get(&self, internal_name: &str) -> Option<&ClassFile> {
        self.classes.get(internal_name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Members no other member declares as nested, in name order.
    pub fn top_level(&self) -> impl Iterator<Item = &ClassFile> + '_ {
        self.classes.values().filter(move |class| {
            let name = class.this_class_name();
            !self.classes.values().any(|outer| nested_class_names(outer).iter().any(|n| n == name))
        })
    }
}

impl ClassLookup for ClassFamily {
    fn lookup(&self, internal_name: &str) -> Option<&ClassFile> {
        self.get(internal_name)
    }
}

/// The main decompiler entry point. Holds no per-class state, so one instance can
/// serve any number of threads.
#[derive(Clone, Debug, Default)]
pub struct Decompiler {
    options: DecompileOptions,
}

impl Decompiler {
    pub fn new(options: DecompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DecompileOptions {
        &self.options
    }

    /// Decompile a single class to Java source. Nested classes are not resolved.
    pub fn decompile(&self, class: &ClassFile) -> String {
        self.decompile_family(class, &ClassFamily::default())
    }

    /// Decompile `class` with its nested classes and accessors resolved through `family`.
    pub fn decompile_family(&self, class: &ClassFile, family: &dyn ClassLookup) -> String {
        self.render_unit(&self.build_unit(class, family)).text
    }

    /// Load and decompile raw class bytes.
    pub fn decompile_bytes(&self, bytes: &[u8]) -> Result<String, DecompileError> {
        let class = parse_class(bytes)?;
        Ok(self.decompile(&class))
    }

    /// Decompile every `(name, bytes)` pair on scoped worker threads. The loaded classes
    /// form one family, so nested classes and accessors resolve across inputs. Results
    /// come back in input order.
    pub fn decompile_all(&self, inputs: &[(String, Vec<u8>)]) -> Vec<Result<String, DecompileError>> {
        let loaded = scoped_map(inputs, |(name, bytes)| {
            parse_class(bytes).map_err(|e| {
                tracing::warn!(class = %name, error = %e, "class file rejected");
                DecompileError::from(e)
            })
        });

        let mut family = ClassFamily::new();
        for class in loaded.iter().flatten() {
            family.insert(class.clone());
        }

        scoped_map(&loaded, |result| match result {
            Ok(class) => Ok(self.decompile_family(class, &family)),
            Err(e) => Err(e.clone()),
        })
    }

    /// The finished syntax tree of `class`: bodies reconstructed, synthetic constructs
    /// removed, types resolved and declarations placed.
    pub fn build_unit(&self, class: &ClassFile, family: &dyn ClassLookup) -> CompilationUnit {
        let mut java = self.build_class(class, family, 0);
        let mut pools = BTreeMap::new();
        collect_pools(&java, class, family, &mut pools);

        let mut accessors = AccessorTable::default();
        accessors.collect(&java);
        if !accessors.is_empty() {
            visit_bodies(&java, &mut |body| accessors.count_calls(body));
            if self.options.eliminate_accessors {
                let rewritten = rewrite_accessors(&mut java, &mut accessors, &mut pools);
                tracing::debug!(class = %java.internal_name, rewritten, "eliminated accessor calls");
            } else {
                accessors.keep_declarations();
            }
        }

        let mut maps = SwitchMaps::new();
        collect_switch_maps(&java, &mut maps);
        desugar_class(&mut java, &maps, &self.desugar_options());
        resolve_class_types(&mut java);
        finalize_class(&mut java, &accessors, self.options.include_synthetic);

        CompilationUnit { package: java.package.clone(), class: java, constant_pools: pools }
    }

    /// Render a syntax tree with the configured formatting.
    pub fn render_unit(&self, unit: &CompilationUnit) -> RenderedSource {
        let mut config = self.options.render_config.clone();
        config.include_synthetic = self.options.include_synthetic;
        JavaRenderer::new(config).render_unit(unit)
    }

    /// Decompile the methods called `method_name`, wrapped in their class declaration.
    pub fn decompile_method(&self, class: &ClassFile, method_name: &str) -> Result<String, DecompileError> {
        let CompilationUnit { package, class: mut java, constant_pools } = self.build_unit(class, &ClassFamily::default());
        java.methods.retain(|m| m.name == method_name);
        if java.methods.is_empty() {
            return Err(DecompileError::MethodNotFound(method_name.to_string()));
        }
        java.fields.clear();
        java.enum_constants.clear();
        java.inner_classes.clear();
        Ok(self.render_unit(&CompilationUnit { package, class: java, constant_pools }).text)
    }

    /// Disassembly and debug tables of the methods called `method_name`.
    pub fn disassemble(&self, class: &ClassFile, method_name: &str) -> Result<String, DecompileError> {
        let pool = &class.const_pool;
        let class_name = class.this_class_name();
        let mut out = String::new();
        let mut found = false;
        for method in class.methods.iter().filter(|m| m.name(pool) == Some(method_name)) {
            found = true;
            let _ = writeln!(out, "// {}{}", method_name, method.descriptor(pool).unwrap_or(""));
            match method.code() {
                Some(code) => out.push_str(&write_method_bytecode(pool, class_name, code)),
                None => out.push_str("// <no code>\n"),
            }
        }
        if !found {
            return Err(DecompileError::MethodNotFound(method_name.to_string()));
        }
        Ok(out)
    }

    fn desugar_options(&self) -> DesugarOptions {
        DesugarOptions {
            foreach: self.options.desugar_foreach,
            enum_switch: self.options.desugar_enum_switch,
            string_switch: self.options.desugar_string_switch,
            assert: self.options.desugar_assert,
            autobox: self.options.desugar_autobox,
        }
    }

    /// Declaration skeleton of `class` with bodies attached, plus its nested family members.
    fn build_class(&self, class: &ClassFile, family: &dyn ClassLookup, depth: usize) -> JavaClass {
        let mut java = build_java_class(class);
        self.attach_bodies(class, &mut java);

        for name in nested_class_names(class) {
            match family.lookup(&name) {
                Some(nested) if depth < MAX_NESTING => java.inner_classes.push(self.build_class(nested, family, depth + 1)),
                Some(_) => tracing::warn!(class = %name, "nested classes too deep, not attached"),
                None => tracing::debug!(class = %name, "nested class not supplied"),
            }
        }
        java
    }

    fn attach_bodies(&self, class: &ClassFile, java: &mut JavaClass) {
        let pool = &class.const_pool;
        let class_name = class.this_class_name();
        let bootstrap = bootstrap_methods(class);

        let results: Vec<Option<Result<StructuredBody, MethodError>>> = if self.options.parallel_methods {
            scoped_map(&class.methods, |m| self.reconstruct(class, m, bootstrap))
        } else {
            class.methods.iter().map(|m| self.reconstruct(class, m, bootstrap)).collect()
        };

        for ((info, method), result) in class.methods.iter().zip(java.methods.iter_mut()).zip(results) {
            let Some(code) = info.code() else { continue };
            match result {
                Some(Ok(body)) => {
                    method.body = Some(body);
                    if self.options.render_config.append_bytecode {
                        method.listing = Some(write_method_bytecode(pool, class_name, code));
                    }
                }
                Some(Err(error)) => {
                    tracing::warn!(
                        class = %class_name,
                        method = %method.name,
                        offset = error.offset(),
                        %error,
                        "method falls back to disassembly"
                    );
                    method.body = None;
                    method.failure = Some(method_failure(pool, class_name, code, &error));
                }
                None => {}
            }
        }
    }

    /// Control flow graph, stack simulation and structuring for one method; `None`
    /// without a `Code` attribute.
    fn reconstruct(
        &self,
        class: &ClassFile,
        method: &MethodInfo,
        bootstrap_methods: &[BootstrapMethod],
    ) -> Option<Result<StructuredBody, MethodError>> {
        if method.access_flags.intersects(MethodAccessFlags::ABSTRACT | MethodAccessFlags::NATIVE) {
            return None;
        }
        let code = method.code()?;
        Some(self.reconstruct_code(class, method, code, bootstrap_methods))
    }

    fn reconstruct_code(
        &self,
        class: &ClassFile,
        method: &MethodInfo,
        code: &CodeAttribute,
        bootstrap_methods: &[BootstrapMethod],
    ) -> Result<StructuredBody, MethodError> {
        let pool = &class.const_pool;
        let name = method.name(pool).unwrap_or("?");
        let mut budget = Budget::new(self.options.method_step_budget, self.options.method_timeout);

        let cfg = build_cfg(code)?;
        tracing::debug!(method = %name, blocks = cfg.blocks.len(), "built control flow graph");
        let ctx = MethodContext {
            pool,
            code,
            class_name: class.this_class_name(),
            is_static: method.access_flags.contains(MethodAccessFlags::STATIC),
            bootstrap_methods,
        };
        let simulated = simulate_method(&ctx, &cfg, &mut budget)?;
        tracing::debug!(method = %name, blocks = simulated.blocks.len(), bindings = simulated.arena.len(), "simulated stack");
        structure_method(&cfg, simulated, pool, code.max_locals, &mut budget)
    }
}

fn bootstrap_methods(class: &ClassFile) -> &[BootstrapMethod] {
    class
        .attributes
        .iter()
        .find_map(|a| match &a.info_parsed {
            Some(AttributeInfoVariant::BootstrapMethods(b)) => Some(b.bootstrap_methods.as_slice()),
            _ => None,
        })
        .unwrap_or(&[])
}

/// Classes declared directly inside `class`: member classes name it as their outer class,
/// local and anonymous ones carry its name as their `$` prefix.
fn nested_class_names(class: &ClassFile) -> Vec<String> {
    let pool = &class.const_pool;
    let this = class.this_class_name();
    let mut names: Vec<String> = inner_class_entries(class)
        .filter_map(|entry| {
            let inner = pool.class_name(entry.inner_class_info_index)?;
            if inner == this {
                return None;
            }
            let direct = match entry.outer_class_info_index {
                0 => inner.rsplit_once('$').map_or(false, |(outer, _)| outer == this),
                idx => pool.class_name(idx) == Some(this),
            };
            direct.then(|| inner.to_string())
        })
        .collect();
    names.dedup();
    names
}

/// Where reconstruction broke down: the source line covering the failing offset and
/// every offset the line table gives for that line.
fn method_failure(pool: &ConstantPool, class_name: &str, code: &CodeAttribute, error: &MethodError) -> MethodFailure {
    let (line, offsets) = match (code.line_for_offset(error.offset()), code.line_number_table()) {
        (Some(line), Some(table)) => {
            let mut offsets: Vec<u32> = table
                .line_number_table
                .iter()
                .filter(|e| e.line_number == line)
                .map(|e| u32::from(e.start_pc))
                .collect();
            offsets.sort_unstable();
            (u32::from(line), offsets)
        }
        _ => (0, Vec::new()),
    };
    MethodFailure {
        message: error.to_string(),
        line,
        offsets,
        listing: write_method_bytecode(pool, class_name, code),
    }
}

fn visit_bodies(class: &JavaClass, f: &mut dyn FnMut(&[StructuredStmt])) {
    for method in &class.methods {
        if let Some(body) = &method.body {
            f(&body.statements);
        }
    }
    for inner in &class.inner_classes {
        visit_bodies(inner, f);
    }
}

/// Copies the pool of every class file that contributed to `java`.
fn collect_pools(java: &JavaClass, class: &ClassFile, family: &dyn ClassLookup, pools: &mut BTreeMap<String, ConstantPool>) {
    let source = if java.internal_name == class.this_class_name() { Some(class) } else { family.lookup(&java.internal_name) };
    if let Some(source) = source {
        pools.insert(java.internal_name.clone(), source.const_pool.clone());
    }
    for inner in &java.inner_classes {
        collect_pools(inner, class, family, pools);
    }
}

/// Rewrites accessor calls everywhere in `class`; Fieldrefs go to the pool of the class
/// holding the call site.
fn rewrite_accessors(
    class: &mut JavaClass,
    accessors: &mut AccessorTable,
    pools: &mut BTreeMap<String, ConstantPool>,
) -> usize {
    let mut rewritten = 0;
    {
        let pool = pools.entry(class.internal_name.clone()).or_default();
        for method in &mut class.methods {
            if let Some(body) = &mut method.body {
                rewritten += accessors.rewrite(&mut body.statements, pool);
            }
        }
        tracing::trace!(class = %class.internal_name, slots = pool.count(), "constant pool after accessor rewrite");
    }
    for inner in &mut class.inner_classes {
        rewritten += rewrite_accessors(inner, accessors, pools);
    }
    rewritten
}

/// Applies `f` to every item on scoped threads, one contiguous chunk per worker.
fn scoped_map<T: Sync, R: Send>(items: &[T], f: impl Fn(&T) -> R + Sync) -> Vec<R> {
    if items.is_empty() {
        return Vec::new();
    }
    let workers = thread::available_parallelism().map_or(1, |n| n.get()).min(items.len());
    let chunk = items.len().div_ceil(workers);
    let f = &f;
    thread::scope(|scope| {
        let handles: Vec<_> = items
            .chunks(chunk)
            .map(|part| scope.spawn(move || part.iter().map(f).collect::<Vec<R>>()))
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(results) => results,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_map_keeps_input_order() {
        let items: Vec<u32> = (0..97).collect();
        let doubled = scoped_map(&items, |n| n * 2);
        assert_eq!(doubled, items.iter().map(|n| n * 2).collect::<Vec<_>>());
        assert!(scoped_map(&[] as &[u32], |n| *n).is_empty());
    }

    #[test]
    fn failure_marker_uses_line_entries() {
        let failure = MethodFailure { message: "x".into(), line: 6, offsets: vec![4], listing: String::new() };
        assert_eq!(failure.marker(), "Decompilation failed at line #6 -> offsets [4]");
    }

    #[test]
    fn decompiler_is_shareable_across_threads() {
        fn assert_sync<T: Sync + Send>() {}
        assert_sync::<Decompiler>();
        assert_sync::<ClassFamily>();
    }
}
