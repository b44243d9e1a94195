//! TaskMethod trait - 登録されるメソッドの定義
//!
//! # 学習ポイント
//! - ジェネリック trait (TaskMethod<T>) と Fn へのブランケット実装
//! - Object-safe trait (DynMethod)
//! - Type erasure パターン (TypedMethod<T, M> → DynMethod)

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;

use super::context::TaskContext;
use super::target::{AnyTarget, Target};

/// TaskMethod は T のインスタンスに対して 1 回分の実行を行う
///
/// # 使用例
/// ```ignore
/// async fn render(report: Arc<Report>, ctx: TaskContext) -> anyhow::Result<()> {
///     ctx.println(format!("rendering {}", report.key));
///     Ok(())
/// }
///
/// builder.register::<Report, _>("render", "Render the report", &[], render);
/// ```
///
/// `Fn(Arc<T>, TaskContext) -> impl Future<Output = anyhow::Result<()>>`
/// はすべて TaskMethod<T> になる。
#[async_trait]
pub trait TaskMethod<T: Target>: Send + Sync + 'static {
    async fn call(&self, target: Arc<T>, ctx: TaskContext) -> anyhow::Result<()>;
}

#[async_trait]
impl<T, F, Fut> TaskMethod<T> for F
where
    T: Target,
    F: Fn(Arc<T>, TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn call(&self, target: Arc<T>, ctx: TaskContext) -> anyhow::Result<()> {
        (self)(target, ctx).await
    }
}

/// DynMethod は object-safe な TaskMethod の抽象化
///
/// HashMap に `Arc<dyn DynMethod>` として格納するための層。
#[async_trait]
pub trait DynMethod: Send + Sync {
    async fn call_dyn(&self, target: AnyTarget, ctx: TaskContext) -> anyhow::Result<()>;
    fn target_type(&self) -> &'static str;
}

pub(crate) struct TypedMethod<T: Target, M: TaskMethod<T>> {
    method: M,
    _marker: PhantomData<T>,
}

impl<T: Target, M: TaskMethod<T>> TypedMethod<T, M> {
    pub(crate) fn new(method: M) -> Self {
        Self {
            method,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Target, M: TaskMethod<T>> DynMethod for TypedMethod<T, M> {
    async fn call_dyn(&self, target: AnyTarget, ctx: TaskContext) -> anyhow::Result<()> {
        let target = target
            .downcast::<T>()
            .map_err(|_| anyhow!("loaded object is not a '{}'", T::TYPE))?;
        self.method.call(target, ctx).await
    }

    fn target_type(&self) -> &'static str {
        T::TYPE
    }
}

/// A registered method bound to a loaded instance, ready to run once.
#[derive(Clone)]
pub struct BoundMethod {
    method: Arc<dyn DynMethod>,
    target: AnyTarget,
}

impl BoundMethod {
    pub(crate) fn new(method: Arc<dyn DynMethod>, target: AnyTarget) -> Self {
        Self { method, target }
    }

    pub fn target_type(&self) -> &'static str {
        self.method.target_type()
    }

    /// Run the method. The returned future owns everything it needs, so it
    /// can be handed to `tokio::spawn`.
    pub async fn invoke(self, ctx: TaskContext) -> anyhow::Result<()> {
        self.method.call_dyn(self.target, ctx).await
    }
}
