//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryTaskStore**: 開発用の正本
//! - **LocalArtifactStore**: ローカルディレクトリへのログ写し

pub mod inmem_store;
pub mod local_artifacts;

pub use self::inmem_store::InMemoryTaskStore;
pub use self::local_artifacts::LocalArtifactStore;
