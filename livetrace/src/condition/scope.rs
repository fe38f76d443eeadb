use indexmap::IndexMap;

use crate::value::Value;

use super::EvalError;

/// The variables visible to one probe hit: the receiver, positional call
/// arguments, and named locals. Borrowed from the caller for the duration
/// of the hit; resolution clones out cheap `Arc` handles.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub receiver: Option<&'a Value>,
    pub args: &'a [Value],
    pub locals: &'a IndexMap<String, Value>,
}

impl<'a> Scope<'a> {
    pub fn new(
        receiver: Option<&'a Value>,
        args: &'a [Value],
        locals: &'a IndexMap<String, Value>,
    ) -> Self {
        Self {
            receiver,
            args,
            locals,
        }
    }

    /// Resolve a variable reference: `argN` (or `args[N]`), `this`,
    /// `this.<field>`, `locals.<name>`, or a free identifier looked up in
    /// the locals. Anything else is unresolved.
    pub fn resolve(&self, path: &str) -> Result<Value, EvalError> {
        let path = path.trim();

        if path == "this" {
            return self
                .receiver
                .cloned()
                .ok_or_else(|| EvalError::Unresolved(path.to_owned()));
        }

        if let Some(field) = path.strip_prefix("this.") {
            return self
                .receiver
                .and_then(|r| r.field(field))
                .ok_or_else(|| EvalError::Unresolved(path.to_owned()));
        }

        if let Some(name) = path.strip_prefix("locals.") {
            return self
                .locals
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::Unresolved(path.to_owned()));
        }

        if let Some(index) = parse_arg_index(path) {
            return self
                .args
                .get(index)
                .cloned()
                .ok_or_else(|| EvalError::Unresolved(path.to_owned()));
        }

        self.locals
            .get(path)
            .cloned()
            .ok_or_else(|| EvalError::Unresolved(path.to_owned()))
    }
}

/// Accepts both spellings seen in the wild: `arg0` and `args[0]`.
fn parse_arg_index(path: &str) -> Option<usize> {
    if let Some(rest) = path.strip_prefix("args[") {
        let inner = rest.strip_suffix(']')?;
        return inner.parse().ok();
    }
    let rest = path.strip_prefix("arg")?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}
