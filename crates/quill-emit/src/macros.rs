//! Binding helpers that name symbols after the variables they are bound to

/// Define one label per identifier, named after the identifier.
///
/// ```ignore
/// define_labels!(e => retry, done);
/// e.br(&done)?;
/// ```
///
/// Expands to `let` bindings and uses `?`, so it must appear in a function
/// returning a compatible `Result`.
#[macro_export]
macro_rules! define_labels {
    ($emitter:expr => $($name:ident),+ $(,)?) => {
        $(
            let $name = {
                use $crate::SymbolScope as _;
                $emitter.define_label(Some(stringify!($name)))?
            };
        )+
    };
}

/// Declare one unpinned local per `name: type` pair, named after the identifier.
///
/// ```ignore
/// declare_locals!(e => sum: int32.clone(), index: int32);
/// e.ldloc(&sum)?;
/// ```
#[macro_export]
macro_rules! declare_locals {
    ($emitter:expr => $($name:ident : $ty:expr),+ $(,)?) => {
        $(
            let $name = {
                use $crate::SymbolScope as _;
                $emitter.declare_local($ty, false, Some(stringify!($name)))?
            };
        )+
    };
}

#[cfg(test)]
mod tests {
    use crate::error::EmitResult;
    use crate::metadata::{TypeCode, TypeRef};
    use crate::{Emitter, SymbolScope};

    fn build(e: &mut Emitter) -> EmitResult<()> {
        define_labels!(e => head, tail);
        declare_locals!(e => total: TypeRef::primitive(TypeCode::Int64));
        assert_eq!(head.name(), "head");
        assert_eq!(tail.ordinal(), 1);
        assert_eq!(total.name(), "total");
        Ok(())
    }

    #[test]
    fn test_names_follow_bindings() {
        let mut e = Emitter::new();
        build(&mut e).unwrap();
        assert_eq!(e.labels().len(), 2);
        assert_eq!(e.locals().len(), 1);
    }
}
