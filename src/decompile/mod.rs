//! Class file to Java source.
//!
//! Each method runs through a fixed pipeline: [`cfg`] splits the bytecode into basic
//! blocks, [`stack_sim`] replays the operand stack into statements, [`webs`] splits
//! reused slots when there is no debug table, and [`structuring`] rebuilds loops,
//! conditionals and exception regions. The class-level passes then
//! remove compiler-generated constructs ([`accessors`], [`desugar`]), settle types
//! ([`type_inference`]) and place declarations ([`finalizer`]) before [`renderer`]
//! prints the tree. [`class_decompiler`] drives the whole thing.

pub mod accessors;
pub mod bytecode_writer;
pub mod cfg;
pub mod cfg_types;
pub mod class_decompiler;
pub mod descriptor;
pub mod desugar;
pub mod expr;
pub mod finalizer;
pub mod java_ast;
pub mod primitive;
pub mod renderer;
pub mod stack_depth;
pub mod stack_sim;
pub mod structured_types;
pub mod structuring;
pub mod type_inference;
pub mod util;
pub mod webs;

pub use class_decompiler::{ClassFamily, ClassLookup, DecompileOptions, Decompiler};
pub use java_ast::{CompilationUnit, JavaClass, JavaMethod, MethodFailure};
pub use renderer::{LineMapping, RenderConfig, RenderedSource};
