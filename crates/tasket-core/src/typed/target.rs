//! Target trait - タスクを実行できる型の定義
//!
//! # 学習ポイント
//! - Associated Constants (`const TYPE`)
//! - ローダー（key → インスタンス）の型消去

use std::any::Any;
use std::sync::Arc;

/// Target は target_type 文字列と Rust の型を対応付ける
///
/// # 使用例
/// ```ignore
/// struct Report { key: String }
///
/// impl Target for Report {
///     const TYPE: &'static str = "acme.reports.Report";
/// }
/// ```
///
/// # Trait Bounds
/// - `Send + Sync`: ワーカーの tokio task に `Arc<Self>` で渡すため
/// - `'static`: `dyn Any` に格納できるため
pub trait Target: Send + Sync + 'static {
    /// target_type の定義（TaskRecord.target.target_type に入る値）
    const TYPE: &'static str;
}

/// 型消去されたインスタンス（ローダーの戻り値）
pub type AnyTarget = Arc<dyn Any + Send + Sync>;

/// 型消去されたローダー
pub(crate) type DynLoader = Arc<dyn Fn(&str) -> anyhow::Result<AnyTarget> + Send + Sync>;

/// `Fn(&str) -> anyhow::Result<T>` を DynLoader に変換
pub(crate) fn erase_loader<T, L>(loader: L) -> DynLoader
where
    T: Target,
    L: Fn(&str) -> anyhow::Result<T> + Send + Sync + 'static,
{
    Arc::new(move |key: &str| {
        let target = loader(key)?;
        Ok(Arc::new(target) as AnyTarget)
    })
}
