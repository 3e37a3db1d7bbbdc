/// A host method exposed on a bound global.
///
/// `arity: None` means variadic; otherwise the bridge checks the argument
/// count itself before calling into the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: String,
    pub arity: Option<usize>,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity: Some(arity),
        }
    }

    pub fn variadic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arity: None,
        }
    }

    pub fn accepts(&self, count: usize) -> bool {
        self.arity.map_or(true, |arity| arity == count)
    }
}
