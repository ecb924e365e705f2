//! Type descriptors: the memoized shape of every type the walker touches.
//!
//! Each type reports a [`Shape`] once through [`Describe`]. The cache turns
//! it into a [`TypeDescriptor`] stored in a process-wide arena. Struct
//! descriptors carry their flattened field list, with embedded members
//! expanded and shadowed names resolved.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

/// Index of a descriptor in the process-wide arena.
pub type TypeIndex = usize;

/// Static shape reporting, implemented for every type the walker handles.
pub trait Describe: 'static {
    fn shape() -> Shape;
}

/// A lazily described type: identity plus the function producing its shape.
#[derive(Clone, Copy)]
pub struct TypeRef {
    pub id: TypeId,
    pub name: &'static str,
    pub shape: fn() -> Shape,
}

impl TypeRef {
    pub fn of<T: Describe>() -> Self {
        TypeRef {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            shape: T::shape,
        }
    }
}

impl std::fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// Scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Bool,
    Int { bits: u8 },
    Uint { bits: u8 },
    Float { bits: u8 },
    Str,
    Bytes,
    Unit,
}

/// Shape reported by [`Describe`]. Child types are unresolved [`TypeRef`]s.
#[derive(Debug, Clone)]
pub enum Shape {
    Scalar(Scalar),
    Seq(TypeRef),
    Array(TypeRef, usize),
    Map(TypeRef, TypeRef),
    /// A sequence whose elements are consecutive key/value pairs.
    MapBySlice(TypeRef),
    Ptr(TypeRef),
    Chan(TypeRef),
    Interface(&'static str),
    /// [`crate::Value`]: whatever the stream holds.
    Dynamic,
    Raw,
    Ext,
    SelfMarshal,
    Struct(StructShape),
}

/// Declared struct layout, as written by the derive.
#[derive(Debug, Clone, Default)]
pub struct StructShape {
    pub name: &'static str,
    /// Struct-level tag, e.g. `",toarray"`.
    pub tag: Option<&'static str>,
    pub omit_empty: bool,
    pub fields: Vec<FieldDecl>,
}

/// One declared field. `index` is what `Reflect::field` expects.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub ident: &'static str,
    pub index: usize,
    pub tag: Option<&'static str>,
    pub omit_empty: bool,
    pub embed: bool,
    pub ty: TypeRef,
}

/// Resolved kind of a described type. Children are arena indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    Scalar(Scalar),
    Seq(TypeIndex),
    Array(TypeIndex, usize),
    Map(TypeIndex, TypeIndex),
    MapBySlice(TypeIndex),
    Ptr(TypeIndex),
    Chan(TypeIndex),
    Interface(&'static str),
    Dynamic,
    Raw,
    Ext,
    SelfMarshal,
    Struct,
}

/// One hop from a struct to a (possibly embedded) field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathStep {
    pub index: usize,
    /// Pointer levels to dereference after taking the field.
    pub derefs: u8,
}

/// A field after flattening.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    /// Name used on the wire.
    pub name: String,
    pub ident: &'static str,
    pub path: Vec<PathStep>,
    pub omit_empty: bool,
    /// 0 for fields declared on the type itself.
    pub depth: usize,
    pub ty: TypeIndex,
}

/// Memoized metadata for one type.
#[derive(Debug)]
pub struct TypeDescriptor {
    pub index: TypeIndex,
    pub id: TypeId,
    pub name: &'static str,
    pub kind: Kind,
    pub fields: Vec<FieldInfo>,
    pub to_array: bool,
    by_name: HashMap<String, usize>,
}

impl TypeDescriptor {
    pub fn field_by_name(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    pub fn is_struct(&self) -> bool {
        self.kind == Kind::Struct
    }

    pub fn is_map_by_slice(&self) -> bool {
        matches!(self.kind, Kind::MapBySlice(_))
    }

    pub fn is_self_marshal(&self) -> bool {
        self.kind == Kind::SelfMarshal
    }
}

/// Parsed tag sublanguage: `name,omitempty,toarray` or `-`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagInfo {
    pub name: Option<String>,
    pub omit_empty: bool,
    pub to_array: bool,
    pub skip: bool,
}

/// Parse a field or struct tag. Unknown options and malformed names are
/// ignored; the field then keeps its declared name.
pub fn parse_tag(tag: &str) -> TagInfo {
    let mut info = TagInfo::default();
    if tag.trim() == "-" {
        info.skip = true;
        return info;
    }
    let mut parts = tag.split(',');
    if let Some(name) = parts.next() {
        let name = name.trim();
        let malformed = name
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\'' || c == '`');
        if malformed {
            log::debug!("[types] ignoring malformed tag name {:?}", name);
        } else if !name.is_empty() {
            info.name = Some(name.to_string());
        }
    }
    for opt in parts {
        match opt.trim() {
            "omitempty" => info.omit_empty = true,
            "toarray" => info.to_array = true,
            "" => {}
            other => log::debug!("[types] ignoring unknown tag option {:?}", other),
        }
    }
    info
}

#[derive(Default)]
struct Registry {
    by_id: HashMap<TypeId, TypeIndex>,
    // None while the slot's type is being built.
    arena: Vec<Option<Arc<TypeDescriptor>>>,
}

fn registry() -> &'static RwLock<Registry> {
    static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Registry::default()))
}

/// Get (building on first use) the descriptor for `T`.
pub fn type_info<T: Describe>() -> Arc<TypeDescriptor> {
    type_info_for(TypeRef::of::<T>())
}

/// Get (building on first use) the descriptor for a type reference.
pub fn type_info_for(r: TypeRef) -> Arc<TypeDescriptor> {
    {
        let reg = registry().read();
        if let Some(ti) = reg.by_id.get(&r.id).and_then(|&i| reg.arena[i].clone()) {
            return ti;
        }
    }
    let mut reg = registry().write();
    let index = build(&mut reg, r);
    match reg.arena[index].clone() {
        Some(ti) => ti,
        // build() fills every slot it reserves before returning to the root.
        None => unreachable!("type descriptor slot {} left empty", index),
    }
}

/// Resolve an arena index, e.g. a field's type.
pub fn type_info_at(index: TypeIndex) -> Option<Arc<TypeDescriptor>> {
    registry().read().arena.get(index).cloned().flatten()
}

fn build(reg: &mut Registry, r: TypeRef) -> TypeIndex {
    if let Some(&index) = reg.by_id.get(&r.id) {
        return index;
    }
    let index = reg.arena.len();
    reg.arena.push(None);
    reg.by_id.insert(r.id, index);

    let mut fields = Vec::new();
    let mut to_array = false;
    let kind = match (r.shape)() {
        Shape::Scalar(s) => Kind::Scalar(s),
        Shape::Seq(e) => Kind::Seq(build(reg, e)),
        Shape::Array(e, n) => Kind::Array(build(reg, e), n),
        Shape::Map(k, v) => {
            let k = build(reg, k);
            Kind::Map(k, build(reg, v))
        }
        Shape::MapBySlice(e) => Kind::MapBySlice(build(reg, e)),
        Shape::Ptr(e) => Kind::Ptr(build(reg, e)),
        Shape::Chan(e) => Kind::Chan(build(reg, e)),
        Shape::Interface(name) => Kind::Interface(name),
        Shape::Dynamic => Kind::Dynamic,
        Shape::Raw => Kind::Raw,
        Shape::Ext => Kind::Ext,
        Shape::SelfMarshal => Kind::SelfMarshal,
        Shape::Struct(s) => {
            let tag = s.tag.map(parse_tag).unwrap_or_default();
            to_array = tag.to_array;
            fields = flatten(reg, &s);
            Kind::Struct
        }
    };

    let mut by_name = HashMap::with_capacity(fields.len());
    for (i, f) in fields.iter().enumerate() {
        by_name.insert(f.name.clone(), i);
    }
    log::debug!(
        "[types] built descriptor #{} for {} ({} fields)",
        index,
        r.name,
        fields.len()
    );
    reg.arena[index] = Some(Arc::new(TypeDescriptor {
        index,
        id: r.id,
        name: r.name,
        kind,
        fields,
        to_array,
        by_name,
    }));
    index
}

/// Expand embedded members in place and resolve name collisions: depth 0
/// wins, then the shallowest, then the first declared.
fn flatten(reg: &mut Registry, s: &StructShape) -> Vec<FieldInfo> {
    let mut candidates: Vec<FieldInfo> = Vec::new();

    for decl in &s.fields {
        let tag = decl.tag.map(parse_tag).unwrap_or_default();
        if tag.skip {
            continue;
        }
        let ty = build(reg, decl.ty);
        let omit_empty = s.omit_empty || decl.omit_empty || tag.omit_empty;

        if decl.embed && tag.name.is_none() {
            let (target, derefs) = deref_chain(reg, ty);
            // An in-progress slot is an ancestor: keep the member as a
            // plain field instead of unrolling the cycle.
            if let Some(inner) = reg.arena[target].clone().filter(|t| t.is_struct()) {
                for f in &inner.fields {
                    let mut path = Vec::with_capacity(f.path.len() + 1);
                    path.push(PathStep {
                        index: decl.index,
                        derefs,
                    });
                    path.extend_from_slice(&f.path);
                    candidates.push(FieldInfo {
                        name: f.name.clone(),
                        ident: f.ident,
                        path,
                        omit_empty: f.omit_empty || s.omit_empty,
                        depth: f.depth + 1,
                        ty: f.ty,
                    });
                }
                continue;
            }
        }

        candidates.push(FieldInfo {
            name: tag.name.unwrap_or_else(|| decl.ident.to_string()),
            ident: decl.ident,
            path: vec![PathStep {
                index: decl.index,
                derefs: 0,
            }],
            omit_empty,
            depth: 0,
            ty,
        });
    }

    let mut winner: HashMap<&str, usize> = HashMap::new();
    for (i, f) in candidates.iter().enumerate() {
        match winner.get(f.name.as_str()) {
            Some(&j) if candidates[j].depth <= f.depth => {}
            _ => {
                winner.insert(f.name.as_str(), i);
            }
        }
    }
    let mut keep: Vec<usize> = winner.into_values().collect();
    keep.sort_unstable();
    let mut keep = keep.into_iter().peekable();
    candidates
        .into_iter()
        .enumerate()
        .filter_map(|(i, f)| {
            if keep.peek() == Some(&i) {
                keep.next();
                Some(f)
            } else {
                None
            }
        })
        .collect()
}

fn deref_chain(reg: &Registry, mut index: TypeIndex) -> (TypeIndex, u8) {
    let mut derefs = 0u8;
    while let Some(Some(ti)) = reg.arena.get(index) {
        match ti.kind {
            Kind::Ptr(inner) => {
                index = inner;
                derefs += 1;
            }
            _ => break,
        }
    }
    (index, derefs)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Leaf;
    impl Describe for Leaf {
        fn shape() -> Shape {
            Shape::Scalar(Scalar::Int { bits: 64 })
        }
    }

    struct Inner;
    impl Describe for Inner {
        fn shape() -> Shape {
            Shape::Struct(StructShape {
                name: "Inner",
                fields: vec![
                    FieldDecl {
                        ident: "field",
                        index: 0,
                        tag: None,
                        omit_empty: false,
                        embed: false,
                        ty: TypeRef::of::<Leaf>(),
                    },
                    FieldDecl {
                        ident: "only_inner",
                        index: 1,
                        tag: Some("oi,omitempty"),
                        omit_empty: false,
                        embed: false,
                        ty: TypeRef::of::<Leaf>(),
                    },
                ],
                ..Default::default()
            })
        }
    }

    struct Outer;
    impl Describe for Outer {
        fn shape() -> Shape {
            Shape::Struct(StructShape {
                name: "Outer",
                tag: Some(",toarray"),
                omit_empty: false,
                fields: vec![
                    FieldDecl {
                        ident: "field",
                        index: 0,
                        tag: None,
                        omit_empty: false,
                        embed: false,
                        ty: TypeRef::of::<Leaf>(),
                    },
                    FieldDecl {
                        ident: "inner",
                        index: 1,
                        tag: None,
                        omit_empty: false,
                        embed: true,
                        ty: TypeRef::of::<Inner>(),
                    },
                    FieldDecl {
                        ident: "hidden",
                        index: 2,
                        tag: Some("-"),
                        omit_empty: false,
                        embed: false,
                        ty: TypeRef::of::<Leaf>(),
                    },
                ],
            })
        }
    }

    #[test]
    fn test_parse_tag() {
        assert_eq!(
            parse_tag("a,omitempty"),
            TagInfo {
                name: Some("a".into()),
                omit_empty: true,
                ..Default::default()
            }
        );
        assert!(parse_tag(",toarray").to_array);
        assert!(parse_tag("-").skip);
        assert_eq!(parse_tag("bad name,bogus").name, None);
    }

    #[test]
    fn test_flatten_outer_wins() {
        let ti = type_info::<Outer>();
        assert!(ti.to_array);
        let names: Vec<_> = ti.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["field", "oi"]);
        let field = ti.field_by_name("field").unwrap();
        assert_eq!(field.depth, 0);
        let oi = ti.field_by_name("oi").unwrap();
        assert!(oi.omit_empty);
        assert_eq!(
            oi.path,
            [
                PathStep { index: 1, derefs: 0 },
                PathStep { index: 1, derefs: 0 }
            ]
        );
    }

    #[test]
    fn test_cache_is_idempotent() {
        let a = type_info::<Inner>();
        let b = type_info::<Inner>();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(type_info_at(a.index).map(|t| t.id), Some(TypeId::of::<Inner>()));
    }
}
