//! Attribute parsing for `#[codec(...)]`.

use syn::{Attribute, Expr, ExprLit, Lit, LitStr, Result};

/// Parsed field attributes from `#[codec(...)]`.
#[derive(Default)]
pub struct FieldAttrs {
    /// Raw tag string, e.g. `"name,omitempty"` or `"-"`.
    pub tag: Option<String>,
    pub omit_empty: bool,
    /// Promote the member's fields into this struct.
    pub embed: bool,
    pub skip: bool,
}

impl FieldAttrs {
    pub fn from_attrs(attrs: &[Attribute]) -> Result<Self> {
        let mut result = FieldAttrs::default();
        for attr in attrs {
            if attr.path().is_ident("codec") {
                result.parse_codec_attr(attr)?;
            }
        }
        Ok(result)
    }

    fn parse_codec_attr(&mut self, attr: &Attribute) -> Result<()> {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("tag") || meta.path.is_ident("rename") {
                self.tag = Some(parse_str(meta.value()?.parse()?)?);
            } else if meta.path.is_ident("omitempty") {
                self.omit_empty = true;
            } else if meta.path.is_ident("embed") {
                self.embed = true;
            } else if meta.path.is_ident("skip") {
                self.skip = true;
            } else {
                return Err(meta.error("unknown codec field attribute"));
            }
            Ok(())
        })
    }
}

/// How the container is walked.
#[derive(Default, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Fields by name (or position with `toarray`).
    #[default]
    Struct,
    /// Newtype over the inner value.
    Transparent,
    /// Newtype over a `Vec` of alternating keys and values.
    MapBySlice,
    /// Encoded through the type's `SelfMarshal` hooks.
    SelfMarshal,
}

/// Parsed container attributes.
#[derive(Default)]
pub struct StructAttrs {
    pub tag: Option<String>,
    pub to_array: bool,
    pub omit_empty: bool,
    pub mode: Mode,
}

impl StructAttrs {
    pub fn from_attrs(attrs: &[Attribute]) -> Result<Self> {
        let mut result = StructAttrs::default();
        for attr in attrs {
            if attr.path().is_ident("codec") {
                result.parse_codec_attr(attr)?;
            }
        }
        Ok(result)
    }

    fn parse_codec_attr(&mut self, attr: &Attribute) -> Result<()> {
        attr.parse_nested_meta(|meta| {
            let mode = if meta.path.is_ident("tag") {
                self.tag = Some(parse_str(meta.value()?.parse()?)?);
                None
            } else if meta.path.is_ident("toarray") {
                self.to_array = true;
                None
            } else if meta.path.is_ident("omitempty") {
                self.omit_empty = true;
                None
            } else if meta.path.is_ident("transparent") {
                Some(Mode::Transparent)
            } else if meta.path.is_ident("map_by_slice") {
                Some(Mode::MapBySlice)
            } else if meta.path.is_ident("self_marshal") {
                Some(Mode::SelfMarshal)
            } else {
                return Err(meta.error("unknown codec container attribute"));
            };
            if let Some(mode) = mode {
                if self.mode != Mode::Struct {
                    return Err(meta.error("only one of transparent, map_by_slice, self_marshal"));
                }
                self.mode = mode;
            }
            Ok(())
        })
    }

    /// The struct-level tag handed to the runtime, with `toarray` merged in.
    pub fn runtime_tag(&self) -> Option<String> {
        let mut tag = self.tag.clone().unwrap_or_default();
        if self.to_array && !self.tag_has("toarray") {
            tag.push_str(",toarray");
        }
        if tag.is_empty() {
            None
        } else {
            Some(tag)
        }
    }

    /// Whether every field is omitted when empty.
    pub fn omit_all(&self) -> bool {
        self.omit_empty || self.tag_has("omitempty")
    }

    fn tag_has(&self, opt: &str) -> bool {
        self.tag
            .as_deref()
            .is_some_and(|t| t.split(',').skip(1).any(|o| o.trim() == opt))
    }
}

fn parse_str(value: Expr) -> Result<String> {
    match value {
        Expr::Lit(ExprLit {
            lit: Lit::Str(lit), ..
        }) => Ok(LitStr::value(&lit)),
        other => Err(syn::Error::new_spanned(other, "expected string literal")),
    }
}
