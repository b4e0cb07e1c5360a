/// An IR-level type. Struct bodies are resolved by looking the name up in
/// the owning [`crate::ir::IrModule`] — IR types never embed another
/// struct's fields inline, only by name, so recursive structs need no
/// special-casing beyond "declare the name before you set its body"
/// (spec.md §4.4).
#[derive(Debug, Clone, PartialEq)]
pub enum IrType {
    Void,
    Int(IntWidth),
    Float(FloatWidth),
    /// An opaque pointer — used for heap struct references, array decay at
    /// parameter boundaries, and string data.
    Pointer,
    Array {
        elem: Box<IrType>,
        len: u32,
    },
    /// A named aggregate type; its field layout lives in the module's type
    /// table, looked up by `name`.
    Named(String),
}

impl IrType {
    pub const BOOL: IrType = IrType::Int(IntWidth::W1);
    pub const CHAR: IrType = IrType::Int(IntWidth::W8);
    pub const I32: IrType = IrType::Int(IntWidth::W32);
    pub const I64: IrType = IrType::Int(IntWidth::W64);

    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Pointer)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, IrType::Void)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IntWidth {
    W1,
    W8,
    W16,
    W32,
    W64,
    W128,
}

impl IntWidth {
    pub fn bits(self) -> u32 {
        match self {
            IntWidth::W1 => 1,
            IntWidth::W8 => 8,
            IntWidth::W16 => 16,
            IntWidth::W32 => 32,
            IntWidth::W64 => 64,
            IntWidth::W128 => 128,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatWidth {
    W32,
    W64,
}

/// A named struct's IR body: field types in declaration order (spec.md §3:
/// "a struct's field layout follows declaration order").
#[derive(Debug, Clone, PartialEq)]
pub struct StructBody {
    pub fields: Vec<IrType>,
}

/// The fixed three-field `Optional<T>` layout, a contract observed by
/// `ok`/`err`/`?`/`is`/`match` (spec.md §3).
pub fn optional_layout(inner: IrType) -> StructBody {
    StructBody {
        fields: vec![IrType::I32, inner, IrType::Pointer],
    }
}

/// The uniform tagged-union enum layout (spec.md §4.3: `{ i32 tag, i64 data
/// }` regardless of payload, a documented limitation — see spec.md §9).
pub fn enum_layout() -> StructBody {
    StructBody {
        fields: vec![IrType::I32, IrType::I64],
    }
}

/// A naive, padding-free byte size for a scalar/pointer IR type — enough
/// for the `malloc`+`memcpy` heap-copy pattern expression lowering uses to
/// materialize struct/enum/`Optional` literals, since every aggregate
/// field that reaches this function has already degraded to a scalar or
/// an opaque pointer (spec.md §3's by-reference invariant).
pub fn ir_type_size_bytes(ty: &IrType) -> u32 {
    match ty {
        IrType::Void => 0,
        IrType::Int(width) => (width.bits() + 7) / 8,
        IrType::Float(FloatWidth::W32) => 4,
        IrType::Float(FloatWidth::W64) => 8,
        IrType::Pointer => 8,
        IrType::Array { elem, len } => ir_type_size_bytes(elem) * len,
        IrType::Named(_) => 8,
    }
}
