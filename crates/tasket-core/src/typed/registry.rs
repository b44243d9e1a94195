//! TaskRegistry - 登録済みメソッドの表
//!
//! # 学習ポイント
//! - HashMap での型消去された trait object の管理
//! - Builder + build() による初期化バリア（起動時検証）
//! - OnceLock によるプロセス全体の共有インスタンス

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use super::method::{BoundMethod, DynMethod, TaskMethod, TypedMethod};
use super::resolver;
use super::target::{erase_loader, AnyTarget, DynLoader, Target};
use crate::domain::{TargetRef, TaskError};

/// One registered method of a target type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef {
    pub method: String,
    pub description: String,
    /// Direct prerequisites, in declaration order.
    pub required: Vec<String>,
}

struct RegisteredMethod {
    def: MethodDef,
    handler: Arc<dyn DynMethod>,
}

#[derive(Default)]
struct TargetEntry {
    loader: Option<DynLoader>,
    /// Registration order.
    methods: Vec<RegisteredMethod>,
}

impl TargetEntry {
    fn find(&self, method: &str) -> Option<&RegisteredMethod> {
        self.methods.iter().find(|m| m.def.method == method)
    }
}

/// RegistryError は build() / install_global() のエラー
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Method '{method}' of model '{target_type}' requires '{required}', which is not registered")]
    PrerequisiteNotRegistered {
        target_type: String,
        method: String,
        required: String,
    },

    #[error("Cycle detected in required tasks of model '{target_type}': {}", chain.join(" -> "))]
    CycleDetected {
        target_type: String,
        chain: Vec<String>,
    },

    #[error("No object loader registered for model '{0}'")]
    MissingLoader(String),

    #[error("A global task registry is already installed")]
    AlreadyInstalled,
}

/// RegistryBuilder はメソッドを登録し、build() で検証する
///
/// # 使用例
/// ```ignore
/// let registry = RegistryBuilder::new()
///     .target::<Report, _>(|key| Report::load(key))
///     .register::<Report, _>("collect", "Collect the data", &[], collect)
///     .register::<Report, _>("render", "Render the report", &["collect"], render)
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - 未登録の前提メソッド、循環依存、ローダーのない型は build() で弾く
/// - build() 後の TaskRegistry は読み取り専用
#[derive(Default)]
pub struct RegistryBuilder {
    targets: HashMap<&'static str, TargetEntry>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register how to load instances of `T` from their key.
    pub fn target<T, L>(mut self, loader: L) -> Self
    where
        T: Target,
        L: Fn(&str) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.targets.entry(T::TYPE).or_default().loader = Some(erase_loader::<T, L>(loader));
        self
    }

    /// Register `handler` as `method` of `T`.
    ///
    /// Registering the same method again replaces the entry in place, keeping
    /// its position in the registration order.
    pub fn register<T, M>(
        mut self,
        method: &str,
        description: &str,
        required: &[&str],
        handler: M,
    ) -> Self
    where
        T: Target,
        M: TaskMethod<T>,
    {
        let registered = RegisteredMethod {
            def: MethodDef {
                method: method.to_string(),
                description: description.to_string(),
                required: required.iter().map(|r| r.to_string()).collect(),
            },
            handler: Arc::new(TypedMethod::<T, M>::new(handler)),
        };

        let entry = self.targets.entry(T::TYPE).or_default();
        match entry.methods.iter_mut().find(|m| m.def.method == method) {
            Some(existing) => *existing = registered,
            None => entry.methods.push(registered),
        }
        self
    }

    /// Validate and freeze the registry.
    pub fn build(self) -> Result<TaskRegistry, RegistryError> {
        let mut types: Vec<&'static str> = self.targets.keys().copied().collect();
        types.sort();

        for target_type in types {
            let entry = &self.targets[target_type];
            if entry.loader.is_none() {
                return Err(RegistryError::MissingLoader(target_type.to_string()));
            }
            for registered in &entry.methods {
                for required in &registered.def.required {
                    if entry.find(required).is_none() {
                        return Err(RegistryError::PrerequisiteNotRegistered {
                            target_type: target_type.to_string(),
                            method: registered.def.method.clone(),
                            required: required.clone(),
                        });
                    }
                }
            }
            for registered in &entry.methods {
                let resolved = resolver::resolve(target_type, &registered.def.method, |m| {
                    entry.find(m).map(|r| r.def.required.as_slice())
                });
                if let Err(TaskError::CycleDetected { chain }) = resolved {
                    return Err(RegistryError::CycleDetected {
                        target_type: target_type.to_string(),
                        chain,
                    });
                }
            }
        }

        Ok(TaskRegistry {
            targets: self.targets,
        })
    }
}

/// TaskRegistry は検証済みの読み取り専用テーブル
///
/// (target_type, method) → 説明・前提メソッド・型消去されたハンドラ。
pub struct TaskRegistry {
    targets: HashMap<&'static str, TargetEntry>,
}

impl TaskRegistry {
    fn entry(&self, target_type: &str) -> Result<&TargetEntry, TaskError> {
        self.targets
            .get(target_type)
            .ok_or_else(|| TaskError::UnknownTargetType(target_type.to_string()))
    }

    fn registered(&self, target_type: &str, method: &str) -> Result<&RegisteredMethod, TaskError> {
        self.entry(target_type)?
            .find(method)
            .ok_or_else(|| TaskError::NotRegistered {
                method: method.to_string(),
                target_type: target_type.to_string(),
            })
    }

    pub fn lookup(&self, target_type: &str, method: &str) -> Result<&MethodDef, TaskError> {
        Ok(&self.registered(target_type, method)?.def)
    }

    /// Every method of `target_type`, in registration order.
    pub fn defined_tasks_for(&self, target_type: &str) -> Result<Vec<&MethodDef>, TaskError> {
        Ok(self.entry(target_type)?.methods.iter().map(|m| &m.def).collect())
    }

    pub fn target_types(&self) -> Vec<&'static str> {
        let mut types: Vec<&'static str> = self.targets.keys().copied().collect();
        types.sort();
        types
    }

    /// Transitive required methods, prerequisites first.
    pub fn resolve(&self, target_type: &str, method: &str) -> Result<Vec<String>, TaskError> {
        let entry = self.entry(target_type)?;
        self.registered(target_type, method)?;
        resolver::resolve(target_type, method, |m| {
            entry.find(m).map(|r| r.def.required.as_slice())
        })
    }

    /// Load the instance `target` refers to.
    pub fn load(&self, target: &TargetRef) -> Result<AnyTarget, TaskError> {
        let entry = self.entry(&target.target_type)?;
        let loader = entry
            .loader
            .as_ref()
            .ok_or_else(|| TaskError::UnknownTargetType(target.target_type.clone()))?;
        loader(&target.target_key).map_err(|err| TaskError::ObjectNotFound {
            target: target.clone(),
            message: format!("{err:#}"),
        })
    }

    /// Load the instance and pair it with the registered method.
    pub fn bind(&self, target: &TargetRef, method: &str) -> Result<BoundMethod, TaskError> {
        let registered = self.registered(&target.target_type, method)?;
        let instance = self.load(target)?;
        Ok(BoundMethod::new(registered.handler.clone(), instance))
    }
}

static GLOBAL: OnceLock<Arc<TaskRegistry>> = OnceLock::new();

/// Install the process-wide registry. Only the first call succeeds.
pub fn install_global(registry: Arc<TaskRegistry>) -> Result<(), RegistryError> {
    GLOBAL
        .set(registry)
        .map_err(|_| RegistryError::AlreadyInstalled)
}

/// The process-wide registry, if one was installed.
pub fn global() -> Option<Arc<TaskRegistry>> {
    GLOBAL.get().cloned()
}
