//! Static types of the language.
//!
//! A type is a kind plus an array dimension count. Two sentinel kinds exist
//! besides the real ones: `Any` matches every valid type and `Invalid` matches
//! nothing, so an earlier error does not cascade into more diagnostics.

use std::fmt;

/// Kind tags usable on their own or inside a pair slot. `Pair` here is the
/// erased pair placeholder (the `pair` in `pair(pair, int)` and the type of
/// `null`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
  Int,
  Bool,
  Char,
  String,
  Pair,
}

/// One side of a pair type. A slot built from a wildcard has no base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
  pub base: Option<BaseType>,
  pub dims: u8,
}

impl Slot {
  pub fn new(base: BaseType, dims: u8) -> Self {
    Self {
      base: Some(base),
      dims,
    }
  }

  fn matches(self, other: Slot) -> bool {
    match (self.base, other.base) {
      (None, _) | (_, None) => true,
      (Some(lhs), Some(rhs)) => lhs == rhs && self.dims == other.dims,
    }
  }

  fn to_type(self) -> Type {
    match self.base {
      Some(base) => Type::base(base).with_dims(self.dims),
      None => Type::any(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
  Base(BaseType),
  Pair(Slot, Slot),
  Any,
  Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Type {
  pub kind: TypeKind,
  pub dims: u8,
}

impl Type {
  pub fn base(base: BaseType) -> Self {
    Self {
      kind: TypeKind::Base(base),
      dims: 0,
    }
  }

  pub fn int() -> Self {
    Self::base(BaseType::Int)
  }

  pub fn bool() -> Self {
    Self::base(BaseType::Bool)
  }

  pub fn char() -> Self {
    Self::base(BaseType::Char)
  }

  pub fn string() -> Self {
    Self::base(BaseType::String)
  }

  /// The erased pair type, also the type of the `null` literal.
  pub fn erased_pair() -> Self {
    Self::base(BaseType::Pair)
  }

  pub fn pair(fst: Slot, snd: Slot) -> Self {
    Self {
      kind: TypeKind::Pair(fst, snd),
      dims: 0,
    }
  }

  /// Combine two expression types into a pair type, keeping each side's
  /// array-ness. An invalid side poisons the whole pair.
  pub fn pair_of(fst: Type, snd: Type) -> Self {
    match (fst.as_slot(), snd.as_slot()) {
      (Some(fst), Some(snd)) => Self::pair(fst, snd),
      _ => Self::invalid(),
    }
  }

  pub fn any() -> Self {
    Self {
      kind: TypeKind::Any,
      dims: 0,
    }
  }

  pub fn invalid() -> Self {
    Self {
      kind: TypeKind::Invalid,
      dims: 0,
    }
  }

  pub fn with_dims(mut self, dims: u8) -> Self {
    self.dims = dims;
    self
  }

  pub fn is_valid(&self) -> bool {
    !matches!(self.kind, TypeKind::Invalid)
  }

  pub fn is_any(&self) -> bool {
    matches!(self.kind, TypeKind::Any)
  }

  pub fn is_array(&self) -> bool {
    self.dims > 0
  }

  /// True for pair types and the erased pair placeholder, arrays excluded.
  pub fn is_pair(&self) -> bool {
    self.dims == 0
      && matches!(
        self.kind,
        TypeKind::Pair(..) | TypeKind::Base(BaseType::Pair)
      )
  }

  /// Copy of this type with one more array dimension.
  pub fn to_array(self) -> Self {
    if !self.is_valid() {
      return self;
    }
    self.with_dims(self.dims.saturating_add(1))
  }

  /// Element type of an array. Wildcards stay wildcards; anything that is not
  /// an array has no element type.
  pub fn element(self) -> Self {
    match self.kind {
      TypeKind::Any => self,
      _ if self.dims > 0 => self.with_dims(self.dims - 1),
      _ => Self::invalid(),
    }
  }

  /// Type of the first element of a pair.
  pub fn fst(self) -> Option<Self> {
    self.side(|fst, _| fst)
  }

  /// Type of the second element of a pair.
  pub fn snd(self) -> Option<Self> {
    self.side(|_, snd| snd)
  }

  fn side(self, pick: impl FnOnce(Slot, Slot) -> Slot) -> Option<Self> {
    if self.dims > 0 {
      return None;
    }
    match self.kind {
      TypeKind::Pair(fst, snd) => Some(pick(fst, snd).to_type()),
      TypeKind::Base(BaseType::Pair) | TypeKind::Any => Some(Self::any()),
      _ => None,
    }
  }

  fn as_slot(self) -> Option<Slot> {
    let base = match self.kind {
      TypeKind::Base(base) => Some(base),
      TypeKind::Pair(..) => Some(BaseType::Pair),
      TypeKind::Any => None,
      TypeKind::Invalid => return None,
    };
    Some(Slot {
      base,
      dims: self.dims,
    })
  }

  /// Type compatibility. Both sides must be valid; a wildcard on either side
  /// matches, otherwise kinds and dimensions must agree structurally.
  pub fn matches(&self, other: &Type) -> bool {
    if !self.is_valid() || !other.is_valid() {
      return false;
    }
    if self.is_any() || other.is_any() {
      return true;
    }
    if self.dims != other.dims {
      return false;
    }
    match (self.kind, other.kind) {
      (TypeKind::Pair(lf, ls), TypeKind::Pair(rf, rs)) => lf.matches(rf) && ls.matches(rs),
      (TypeKind::Base(BaseType::Pair), TypeKind::Pair(..))
      | (TypeKind::Pair(..), TypeKind::Base(BaseType::Pair)) => true,
      (TypeKind::Base(lhs), TypeKind::Base(rhs)) => lhs == rhs,
      _ => false,
    }
  }

  /// Bytes a value of this type occupies inside a heap block.
  pub fn size(&self) -> u32 {
    match self.kind {
      TypeKind::Base(BaseType::Bool | BaseType::Char) if self.dims == 0 => 1,
      _ => 4,
    }
  }
}

impl fmt::Display for BaseType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      BaseType::Int => "int",
      BaseType::Bool => "bool",
      BaseType::Char => "char",
      BaseType::String => "string",
      BaseType::Pair => "pair",
    };
    f.write_str(name)
  }
}

impl fmt::Display for Slot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.base {
      Some(base) => write!(f, "{base}")?,
      None => f.write_str("any")?,
    }
    for _ in 0..self.dims {
      f.write_str("[]")?;
    }
    Ok(())
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.kind {
      TypeKind::Base(base) => write!(f, "{base}")?,
      TypeKind::Pair(fst, snd) => write!(f, "pair({fst}, {snd})")?,
      TypeKind::Any => f.write_str("any")?,
      TypeKind::Invalid => return f.write_str("invalid"),
    }
    for _ in 0..self.dims {
      f.write_str("[]")?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;

  fn base_type() -> impl Strategy<Value = BaseType> {
    prop_oneof![
      Just(BaseType::Int),
      Just(BaseType::Bool),
      Just(BaseType::Char),
      Just(BaseType::String),
      Just(BaseType::Pair),
    ]
  }

  fn slot() -> impl Strategy<Value = Slot> {
    (proptest::option::of(base_type()), 0u8..3).prop_map(|(base, dims)| Slot { base, dims })
  }

  fn any_type() -> impl Strategy<Value = Type> {
    prop_oneof![
      (base_type(), 0u8..3).prop_map(|(base, dims)| Type::base(base).with_dims(dims)),
      (slot(), slot(), 0u8..2).prop_map(|(fst, snd, dims)| Type::pair(fst, snd).with_dims(dims)),
      Just(Type::any()),
      Just(Type::invalid()),
    ]
  }

  proptest! {
    #[test]
    fn matching_is_reflexive_for_valid_types(ty in any_type()) {
      prop_assert_eq!(ty.matches(&ty), ty.is_valid());
    }

    #[test]
    fn matching_is_symmetric(lhs in any_type(), rhs in any_type()) {
      prop_assert_eq!(lhs.matches(&rhs), rhs.matches(&lhs));
    }

    #[test]
    fn wildcard_matches_every_valid_type(ty in any_type()) {
      prop_assert_eq!(Type::any().matches(&ty), ty.is_valid());
    }

    #[test]
    fn invalid_matches_nothing(ty in any_type()) {
      prop_assert!(!Type::invalid().matches(&ty));
    }
  }

  #[test]
  fn invalid_does_not_match_itself() {
    assert!(!Type::invalid().matches(&Type::invalid()));
  }

  #[test]
  fn array_dimensions_must_agree() {
    let ints = Type::int().to_array();
    assert!(ints.matches(&Type::int().to_array()));
    assert!(!ints.matches(&Type::int()));
    assert!(!ints.matches(&Type::char().to_array()));
    assert_eq!(ints.element(), Type::int());
    assert!(!Type::int().element().is_valid());
  }

  #[test]
  fn erased_pair_matches_concrete_pairs() {
    let concrete = Type::pair(Slot::new(BaseType::Int, 0), Slot::new(BaseType::Char, 1));
    assert!(Type::erased_pair().matches(&concrete));
    assert!(!Type::erased_pair().matches(&Type::int()));
    assert!(!Type::erased_pair().matches(&concrete.to_array()));
  }

  #[test]
  fn pair_sides_keep_their_array_flags() {
    let pair = Type::pair_of(Type::int().to_array(), Type::bool());
    assert_eq!(pair.fst(), Some(Type::int().to_array()));
    assert_eq!(pair.snd(), Some(Type::bool()));
    assert_eq!(Type::int().fst(), None);
    assert_eq!(Type::erased_pair().snd(), Some(Type::any()));
  }

  #[test]
  fn nested_pairs_are_erased_in_slots() {
    let inner = Type::pair_of(Type::int(), Type::int());
    let outer = Type::pair_of(inner, Type::char());
    assert_eq!(outer.to_string(), "pair(pair, char)");
    assert!(outer.fst().is_some_and(|fst| fst.matches(&inner)));
  }

  #[test]
  fn display_names() {
    assert_eq!(Type::int().to_string(), "int");
    assert_eq!(Type::string().to_array().to_string(), "string[]");
    assert_eq!(Type::any().to_array().to_string(), "any[]");
    assert_eq!(Type::invalid().to_string(), "invalid");
  }
}
