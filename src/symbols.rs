//! Scoped symbol table.
//!
//! Variables live in a stack of scopes searched innermost first. Function
//! signatures are global and recorded once, before any body is checked, so
//! forward and mutual references resolve.

use std::collections::HashMap;

use crate::ty::Type;

#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
  pub name: String,
  pub return_type: Type,
  pub params: Vec<(String, Type)>,
}

#[derive(Debug, Default)]
struct Scope {
  variables: HashMap<String, Type>,
}

#[derive(Debug)]
pub struct SymbolTable {
  scopes: Vec<Scope>,
  functions: HashMap<String, Signature>,
  current_function: Option<String>,
}

impl Default for SymbolTable {
  fn default() -> Self {
    Self::new()
  }
}

impl SymbolTable {
  /// A table holding only the program's outermost scope.
  pub fn new() -> Self {
    Self {
      scopes: vec![Scope::default()],
      functions: HashMap::new(),
      current_function: None,
    }
  }

  /// Push a fresh scope and return the depth it was pushed at.
  pub fn new_scope(&mut self) -> usize {
    self.scopes.push(Scope::default());
    self.scopes.len() - 1
  }

  /// Pop the innermost scope. The outermost scope is never popped.
  pub fn end_scope(&mut self) {
    if self.scopes.len() > 1 {
      self.scopes.pop();
    }
  }

  pub fn depth(&self) -> usize {
    self.scopes.len()
  }

  /// Declare a variable in the innermost scope. Fails if the name is already
  /// bound in that same scope; shadowing an outer binding is fine.
  pub fn add_variable(&mut self, name: &str, ty: Type) -> bool {
    let Some(scope) = self.scopes.last_mut() else {
      return false;
    };
    if scope.variables.contains_key(name) {
      return false;
    }
    scope.variables.insert(name.to_string(), ty);
    true
  }

  pub fn add_function(&mut self, name: &str, return_type: Type) -> bool {
    if self.functions.contains_key(name) {
      return false;
    }
    self.functions.insert(
      name.to_string(),
      Signature {
        name: name.to_string(),
        return_type,
        params: Vec::new(),
      },
    );
    true
  }

  pub fn add_param_to_function(&mut self, function: &str, param: &str, ty: Type) -> bool {
    match self.functions.get_mut(function) {
      Some(signature) => {
        signature.params.push((param.to_string(), ty));
        true
      }
      None => false,
    }
  }

  /// Make `name` the current function and bind its parameters in the
  /// innermost scope. Returns the parameters that clashed with each other.
  pub fn enter_function(&mut self, name: &str) -> Vec<String> {
    self.current_function = Some(name.to_string());
    let params = self
      .functions
      .get(name)
      .map(|signature| signature.params.clone())
      .unwrap_or_default();
    params
      .into_iter()
      .filter_map(|(param, ty)| (!self.add_variable(&param, ty)).then_some(param))
      .collect()
  }

  pub fn leave_function(&mut self) {
    self.current_function = None;
  }

  pub fn current_function(&self) -> Option<&str> {
    self.current_function.as_deref()
  }

  /// Variable type, innermost binding first. Unknown names yield the invalid
  /// type; callers report the missing symbol themselves.
  pub fn lookup_type(&self, name: &str) -> Type {
    self.lookup_variable(name).unwrap_or_else(Type::invalid)
  }

  pub fn lookup_variable(&self, name: &str) -> Option<Type> {
    self
      .scopes
      .iter()
      .rev()
      .find_map(|scope| scope.variables.get(name).copied())
  }

  pub fn is_declared(&self, name: &str) -> bool {
    self.lookup_variable(name).is_some()
  }

  pub fn is_function(&self, name: &str) -> bool {
    self.functions.contains_key(name)
  }

  pub fn function(&self, name: &str) -> Option<&Signature> {
    self.functions.get(name)
  }

  pub fn lookup_function_type(&self, name: &str) -> Type {
    self
      .functions
      .get(name)
      .map_or_else(Type::invalid, |signature| signature.return_type)
  }

  pub fn num_params(&self, name: &str) -> usize {
    self
      .functions
      .get(name)
      .map_or(0, |signature| signature.params.len())
  }

  pub fn function_param_type(&self, name: &str, index: usize) -> Type {
    self
      .functions
      .get(name)
      .and_then(|signature| signature.params.get(index))
      .map_or_else(Type::invalid, |(_, ty)| *ty)
  }
}
