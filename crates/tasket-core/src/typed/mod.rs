//! Typed - 型付きのタスク登録 API
//!
//! target_type と method 名の対応を型で持ち、リフレクションなしで
//! (target_type, method) からハンドラを引けるようにします。
//!
//! # 二層構造
//! - **表層（Typed）**: `Target` trait, `TaskMethod<T>` trait - 型安全
//! - **内部（Dyn）**: `DynMethod` trait - object-safe, type erasure

pub mod context;
pub mod method;
pub mod registry;
pub mod resolver;
pub mod target;

pub use self::context::{Cancelled, OutputWriter, TaskContext, TaskOutput};
pub use self::method::{BoundMethod, DynMethod, TaskMethod};
pub use self::registry::{global, install_global, MethodDef, RegistryBuilder, RegistryError, TaskRegistry};
pub use self::target::Target;
