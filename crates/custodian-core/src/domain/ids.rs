//! Domain names (strongly-typed account / container / object / task names).
//!
//! # Phantom Type パターン
//! `Name<T>` は共通の検証・表示ロジックを一箇所にまとめつつ、
//! `T`（マーカー型）でコンパイル時に種類を区別します。
//! AccountName と ContainerName を取り違えることはできません。
//!
//! ## 検証ルール
//! - 空文字は不可
//! - account / container / task container は `/` を含まない
//! - object 名は `/` を含んでよい（パスの残り全部が object 名）

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Rejected name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("{kind} name must not be empty")]
    Empty { kind: &'static str },

    #[error("{kind} name must not contain '/': {value:?}")]
    ContainsSlash { kind: &'static str, value: String },

    #[error("invalid object path {0:?}: expected /<account>/<container>/<object>")]
    InvalidPath(String),
}

/// NameMarker は各 Name 型のマーカー trait
pub trait NameMarker: Send + Sync + 'static {
    /// エラーメッセージで使う種類名
    const KIND: &'static str;

    /// `/` を許可するか
    const ALLOWS_SLASH: bool;
}

/// ジェネリック名前型
#[derive(Serialize, Deserialize)]
#[serde(try_from = "String", into = "String", bound = "")]
pub struct Name<T: NameMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: NameMarker> Name<T> {
    pub fn new(value: impl Into<String>) -> Result<Self, NameError> {
        let value = value.into();
        if value.is_empty() {
            return Err(NameError::Empty { kind: T::KIND });
        }
        if !T::ALLOWS_SLASH && value.contains('/') {
            return Err(NameError::ContainsSlash {
                kind: T::KIND,
                value,
            });
        }
        Ok(Self {
            value,
            _marker: PhantomData,
        })
    }

    /// 検証済みの値（定数、数値のフォーマット結果）から作る
    pub(crate) fn from_trusted(value: String) -> Self {
        debug_assert!(Self::new(value.clone()).is_ok());
        Self {
            value,
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

// derive だと T にも境界が付いてしまうので手書き
impl<T: NameMarker> Clone for Name<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: NameMarker> PartialEq for Name<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: NameMarker> Eq for Name<T> {}

impl<T: NameMarker> PartialOrd for Name<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: NameMarker> Ord for Name<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T: NameMarker> std::hash::Hash for Name<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T: NameMarker> fmt::Debug for Name<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", T::KIND, self.value)
    }
}

impl<T: NameMarker> fmt::Display for Name<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T: NameMarker> TryFrom<String> for Name<T> {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl<T: NameMarker> From<Name<T>> for String {
    fn from(name: Name<T>) -> Self {
        name.value
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Account {}

impl NameMarker for Account {
    const KIND: &'static str = "account";
    const ALLOWS_SLASH: bool = false;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Container {}

impl NameMarker for Container {
    const KIND: &'static str = "container";
    const ALLOWS_SLASH: bool = false;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Object {}

impl NameMarker for Object {
    const KIND: &'static str = "object";
    const ALLOWS_SLASH: bool = true;
}

/// Hidden-namespace entry name. Its format depends on the namespace, see
/// [`crate::domain::task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl NameMarker for Task {
    const KIND: &'static str = "task";
    const ALLOWS_SLASH: bool = true;
}

pub type AccountName = Name<Account>;
pub type ContainerName = Name<Container>;
pub type ObjectName = Name<Object>;
pub type TaskId = Name<Task>;

/// Storage policy index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyIndex(pub u32);

impl fmt::Display for PolicyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Full path of a user object: `/<account>/<container>/<object>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectPath {
    pub account: AccountName,
    pub container: ContainerName,
    pub object: ObjectName,
}

impl ObjectPath {
    pub fn new(account: AccountName, container: ContainerName, object: ObjectName) -> Self {
        Self {
            account,
            container,
            object,
        }
    }

    /// Parse `a/c/o` or `/a/c/o`. The object part may contain further slashes.
    pub fn parse(path: &str) -> Result<Self, NameError> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let mut parts = trimmed.splitn(3, '/');
        let (Some(account), Some(container), Some(object)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(NameError::InvalidPath(path.to_string()));
        };
        Ok(Self {
            account: AccountName::new(account)?,
            container: ContainerName::new(container)?,
            object: ObjectName::new(object)?,
        })
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}/{}", self.account, self.container, self.object)
    }
}

/// A task container inside a hidden account: the unit of partitioning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    pub account: AccountName,
    pub container: ContainerName,
}

impl Scope {
    pub fn new(account: AccountName, container: ContainerName) -> Self {
        Self { account, container }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.container)
    }
}
