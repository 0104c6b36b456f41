//! COM interfaces.
//!
//! With marshaling, an interface is declared as such and the runtime supplies `IUnknown`.
//! Without it, the interface becomes a struct over an explicit vtable that lists every
//! method of every base, `IUnknown` included.

use tracing::trace;

use crate::{
    ledger::Context,
    metadata::{
        customattributes::{decode_guid, find_decoration, GUID},
        tables::{MethodDefinition, TypeDefinition},
        token::Token,
    },
    synth::{
        declarations::{InterfaceDecl, MethodSig},
        Element, Synthesizer,
    },
    Result,
};

/// The root of every COM interface.
pub const IUNKNOWN: &str = "IUnknown";

impl Synthesizer<'_> {
    pub(crate) fn synthesize_interface(
        &self,
        def: &TypeDefinition,
        context: Context,
    ) -> Result<InterfaceDecl> {
        let vtable = !context.allow_marshaling;

        let base = match def.interfaces.first() {
            Some(&base) if vtable || !self.is_iunknown(base)? => {
                Some(self.request_type(base, context)?)
            }
            _ => None,
        };

        let methods = if vtable || def.name != IUNKNOWN {
            self.interface_methods(def, context)?
        } else {
            Vec::new()
        };

        let mut inherited = Vec::new();
        if let Some(&base) = def.interfaces.first() {
            self.inherited_methods(base, context, vtable, &mut inherited)?;
        }

        Ok(InterfaceDecl {
            guid: find_decoration(self.reader.custom_attributes(def.token), GUID)
                .and_then(decode_guid),
            base,
            methods,
            inherited,
            vtable,
        })
    }

    fn is_iunknown(&self, token: Token) -> Result<bool> {
        Ok(match self.local_definition(token) {
            Some(def) => self.reader.type_definition(def)?.name == IUNKNOWN,
            None => self.reader.type_name(token)?.1 == IUNKNOWN,
        })
    }

    fn interface_methods(&self, def: &TypeDefinition, context: Context) -> Result<Vec<MethodSig>> {
        let mut methods = Vec::with_capacity(def.methods.len());
        for &token in &def.methods {
            let method = self.reader.method(token)?;
            if !method.signature.has_this {
                continue;
            }

            let signature = self
                .method_sig(method, context)
                .map_err(|error| error.wrap_generation(&method.name))?;
            methods.push(signature);
        }
        Ok(methods)
    }

    fn method_sig(&self, method: &MethodDefinition, context: Context) -> Result<MethodSig> {
        Ok(MethodSig {
            name: method.name.clone(),
            ret: self.type_expr(&method.signature.return_type.base, context, Element::Return)?,
            ret_marshal_as: method.param(0).and_then(|ret| self.marshal_as(ret.token)),
            params: self.param_decls(method, context)?,
        })
    }

    /// Appends the methods of `base` and its own bases, outermost base first.
    fn inherited_methods(
        &self,
        base: Token,
        context: Context,
        vtable: bool,
        out: &mut Vec<MethodSig>,
    ) -> Result<()> {
        let Some(local) = self.local_definition(base) else {
            trace!(%base, "Base interface lives in another store; methods not inherited");
            return Ok(());
        };
        let def = self.reader.type_definition(local)?;
        if !vtable && def.name == IUNKNOWN {
            return Ok(());
        }

        if let Some(&grand) = def.interfaces.first() {
            self.inherited_methods(grand, context, vtable, out)?;
        }
        out.extend(self.interface_methods(def, context)?);
        Ok(())
    }
}
