use rustc_hash::FxHashMap;

use super::types::StructBody;
use super::IrFunction;

/// A module-global NUL-terminated byte string, backing string literals
/// (spec.md §4.6: "String → pointer to a module-global NUL-terminated byte
/// array").
#[derive(Debug, Clone)]
pub struct StringConstant {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// One compiled unit, matching one source module (spec.md §3: "A module
/// name matches the source module's short name"). Struct/enum type bodies
/// and functions declared here are local to this IR context; anything
/// imported from another module is rebuilt by name (spec.md §4.5) rather
/// than shared by reference.
#[derive(Debug, Clone)]
pub struct IrModule {
    pub name: String,
    pub types: FxHashMap<String, StructBody>,
    pub functions: Vec<IrFunction>,
    pub globals: Vec<StringConstant>,
    next_global_id: u32,
}

impl IrModule {
    pub fn new(name: impl Into<String>) -> Self {
        IrModule {
            name: name.into(),
            types: FxHashMap::default(),
            functions: Vec::new(),
            globals: Vec::new(),
            next_global_id: 0,
        }
    }

    /// Declares an opaque named struct type with no body yet — required so
    /// recursive structs can reference themselves before their field list
    /// is known (spec.md §4.4).
    pub fn declare_opaque_type(&mut self, name: impl Into<String>) {
        self.types.entry(name.into()).or_insert(StructBody { fields: Vec::new() });
    }

    pub fn set_type_body(&mut self, name: &str, body: StructBody) {
        self.types.insert(name.to_owned(), body);
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn find_function(&self, name: &str) -> Option<&IrFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn find_function_mut(&mut self, name: &str) -> Option<&mut IrFunction> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    pub fn add_function(&mut self, function: IrFunction) {
        self.functions.push(function);
    }

    /// Interns a string literal as a module-global constant, returning its
    /// symbol name. Equal byte contents get distinct globals (no dedup) —
    /// simple and matches the reference's unconditional-allocation style.
    pub fn intern_string(&mut self, value: &str) -> String {
        let name = format!("{}.str.{}", self.name, self.next_global_id);
        self.next_global_id += 1;
        self.globals.push(StringConstant {
            name: name.clone(),
            bytes: value.as_bytes().to_vec(),
        });
        name
    }

    /// Runs [`IrFunction::verify`] over every owned function; the first
    /// failure becomes `IRVerificationFailed` (spec.md §7).
    pub fn verify(&self) -> Result<(), String> {
        for function in &self.functions {
            function.verify()?;
        }
        Ok(())
    }
}
