//! Delegates and function pointers.

use crate::{
    ledger::Context,
    metadata::{
        customattributes::{
            find_attribute, INTEROP_SERVICES_NAMESPACE, UNMANAGED_FUNCTION_POINTER,
        },
        tables::{MethodDefinition, TypeDefinition},
    },
    synth::{
        declarations::{CallingConvention, DelegateDecl, MethodSig, TypeExpr},
        Element, Synthesizer,
    },
    Result,
};

/// Delegates that stand for an arbitrary function address rather than one signature.
const UNTYPED_DELEGATES: &[&str] = &["PROC", "FARPROC"];

/// Returns `true` for delegates declared as a raw address wrapper.
pub(crate) fn is_untyped(name: &str) -> bool {
    UNTYPED_DELEGATES.contains(&name)
}

impl Synthesizer<'_> {
    fn invoke_method(&self, def: &TypeDefinition) -> Result<&MethodDefinition> {
        for &token in &def.methods {
            let method = self.reader.method(token)?;
            if method.name == "Invoke" {
                return Ok(method);
            }
        }
        Err(malformed_error!("Delegate {} has no Invoke method", def.name))
    }

    fn declared_convention(&self, def: &TypeDefinition) -> Option<CallingConvention> {
        find_attribute(
            self.reader.custom_attributes(def.token),
            INTEROP_SERVICES_NAMESPACE,
            UNMANAGED_FUNCTION_POINTER,
        )
        .and_then(|attribute| attribute.arg(0))
        .and_then(|arg| arg.as_i64())
        .and_then(CallingConvention::from_runtime)
    }

    /// The function pointer type standing in for a delegate where marshaling is not allowed.
    pub(crate) fn function_pointer_for(
        &self,
        def: &TypeDefinition,
        context: Context,
    ) -> Result<TypeExpr> {
        let invoke = self.invoke_method(def)?;
        if invoke
            .param(0)
            .and_then(|ret| self.marshal_as(ret.token))
            .is_some()
        {
            return Err(
                not_supported!("Marshaling is not supported for function pointers.")
                    .wrap_generation(&def.name),
            );
        }

        let convention = self
            .declared_convention(def)
            .unwrap_or(CallingConvention::Stdcall);
        let pointer = self
            .function_pointer(&invoke.signature, convention, context)
            .map_err(|error| error.wrap_generation(&def.name))?;
        Ok(TypeExpr::FunctionPointer(Box::new(pointer)))
    }

    pub(crate) fn synthesize_delegate(
        &self,
        def: &TypeDefinition,
        context: Context,
    ) -> Result<DelegateDecl> {
        let invoke = self.invoke_method(def)?;
        let ret = self.type_expr(&invoke.signature.return_type.base, context, Element::Return)?;
        let params = self.param_decls(invoke, context)?;

        Ok(DelegateDecl {
            convention: self.declared_convention(def),
            signature: MethodSig {
                name: "Invoke".to_string(),
                ret,
                ret_marshal_as: invoke.param(0).and_then(|ret| self.marshal_as(ret.token)),
                params,
            },
        })
    }
}
