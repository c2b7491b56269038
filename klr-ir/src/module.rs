//! Module: named collection of globals and functions

use crate::function::Function;
use crate::value::{FuncId, FuncRef, GlobalId, ValueId};
use klr_common::{IrError, TypeDesc};

/// Module-level global variable
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub id: GlobalId,
    pub name: String,
    pub ty: TypeDesc,
}

#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            globals: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn add_global(&mut self, name: impl Into<String>, ty: TypeDesc) -> GlobalId {
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(Global {
            id,
            name: name.into(),
            ty,
        });
        id
    }

    /// Add a function with the given parameters
    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        params: &[(&str, TypeDesc)],
        ret: TypeDesc,
    ) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        let mut func = Function::new(id, name, ret);
        for (name, ty) in params {
            func.add_param(*name, ty.clone());
        }
        self.functions.push(func);
        id
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.0 as usize]
    }

    pub fn function_by_name(&self, name: &str) -> Result<FuncId, IrError> {
        self.functions
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.id)
            .ok_or_else(|| IrError::UnknownFunction(name.to_string()))
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.0 as usize]
    }

    /// Call target for `build_call`
    pub fn callee(&self, id: FuncId) -> FuncRef {
        let func = self.function(id);
        FuncRef {
            id,
            name: func.name.clone(),
            ret: func.ret.clone(),
        }
    }

    /// The value standing for `global` inside function `func`
    pub fn global_ref(&mut self, func: FuncId, global: GlobalId) -> ValueId {
        let Global { name, ty, .. } = self.global(global).clone();
        self.function_mut(func).import_global(global, &name, ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_lookup() {
        let mut m = Module::new("test");
        let f = m.add_function("f", &[("a", TypeDesc::Int32)], TypeDesc::Void);
        assert_eq!(m.function_by_name("f"), Ok(f));
        assert_eq!(
            m.function_by_name("g"),
            Err(IrError::UnknownFunction("g".to_string()))
        );
        assert_eq!(m.function(f).params().len(), 1);
        assert_eq!(m.callee(f).name, "f");
    }

    #[test]
    fn test_global_ref_per_function() {
        let mut m = Module::new("test");
        let g = m.add_global("counter", TypeDesc::Int64);
        let f1 = m.add_function("f1", &[], TypeDesc::Void);
        let f2 = m.add_function("f2", &[], TypeDesc::Void);
        let r1 = m.global_ref(f1, g);
        let r2 = m.global_ref(f2, g);
        assert_eq!(m.global_ref(f1, g), r1);
        assert_eq!(m.function(f1).value(r1).name, "counter");
        assert_eq!(m.function(f2).value(r2).ty, Some(TypeDesc::Int64));
    }
}
