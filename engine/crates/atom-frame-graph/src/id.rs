use std::{
    borrow::Borrow,
    fmt::{Debug, Display, Formatter},
    ops::Deref,
    sync::Arc,
};

/// 字符串 id：克隆开销低，可以直接用 `&str` 在表中查找
macro_rules! define_string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Arc<str>);

        impl $name {
            #[inline]
            pub fn new(id: impl AsRef<str>) -> Self {
                Self(Arc::from(id.as_ref()))
            }

            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Deref for $name {
            type Target = str;

            #[inline]
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            #[inline]
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            #[inline]
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            #[inline]
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }

        impl From<String> for $name {
            #[inline]
            fn from(id: String) -> Self {
                Self(Arc::from(id))
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({:?})", stringify!($name), &*self.0)
            }
        }
    };
}

define_string_id! {
    /// attachment 的名字，同一帧内唯一，可以跨帧复用
    AttachmentId
}

define_string_id! {
    /// scope 的名字，注册时检查唯一性
    ScopeId
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_lookup_by_str() {
        let mut table = HashMap::new();
        table.insert(AttachmentId::new("Depth"), 1);
        assert_eq!(table.get("Depth"), Some(&1));
        assert_eq!(table.get("Color"), None);

        let id: ScopeId = "Forward".into();
        assert_eq!(id.to_string(), "Forward");
        assert_eq!(format!("{id:?}"), "ScopeId(\"Forward\")");
        assert_eq!(id, ScopeId::from(String::from("Forward")));
    }
}
