use serde::{Deserialize, Serialize};

/// Parts of a fully-qualified method label such as
/// `com.acme.Repo.load(int, java.lang.String)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSignature {
    /// Package of the declaring class (`com.acme`), empty for the default package.
    pub package_name: String,
    /// Qualified declaring class (`com.acme.Repo`), empty when the label has no class part.
    pub class_name: String,
    /// Bare method name (`load`).
    pub method_name: String,
    /// Raw argument list without parentheses (`int, java.lang.String`).
    pub arguments: String,
}

impl MethodSignature {
    pub fn parse(label: &str) -> Self {
        let label = label.trim();
        let (head, arguments) = match label.find('(') {
            Some(open) => {
                let close = label.rfind(')').filter(|&c| c > open).unwrap_or(label.len());
                (&label[..open], label[open + 1..close].trim())
            }
            None => (label, ""),
        };

        let (class_name, method_name) = match head.rfind('.') {
            Some(dot) => (&head[..dot], &head[dot + 1..]),
            None => ("", head),
        };
        let package_name = class_name
            .rfind('.')
            .map(|dot| &class_name[..dot])
            .unwrap_or("");

        Self {
            package_name: package_name.to_string(),
            class_name: class_name.to_string(),
            method_name: method_name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    /// Class name without its package (`Repo`).
    pub fn simple_class_name(&self) -> &str {
        self.class_name
            .rsplit('.')
            .next()
            .unwrap_or(self.class_name.as_str())
    }
}
