// 类型注册表和工厂函数

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::type_options::TypeOptions;

// Trait-based 构造函数类型
// 返回 Box<dyn Any>，实际上它包含的是 Box<dyn Trait>
// 使用 Arc 以便在释放读锁之后再调用构造函数：构造函数内部可能再次访问注册表
type TraitConstructor = Arc<dyn Fn(JsonValue) -> Result<Box<dyn Any + Send + Sync>> + Send + Sync>;

// Trait 注册表：为每个 Trait 类型维护一个独立的注册表
// 外层 HashMap 的 key 是 Trait 的 TypeId，内层 HashMap 的 key 是类型名称
static TRAIT_REGISTRY: Lazy<RwLock<HashMap<TypeId, HashMap<String, TraitConstructor>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// 为实现特定 Trait 的类型注册构造函数
///
/// 同一个 Trait 可以注册多个实现，运行时根据 TypeOptions 中的 `type` 选择。
/// 重复注册同一名称会覆盖之前的构造函数。
///
/// # 类型参数
/// - `T`: 具体实现类型
/// - `Trait`: 目标 trait（使用 `dyn Trait` 形式）
/// - `Config`: 配置类型
///
/// # 示例
/// ```ignore
/// register_trait::<MemoryListSink, dyn ListSink, MemoryListSinkConfig>("MemoryListSink")?;
///
/// let sink: Box<dyn ListSink> = create_trait_from_type_options(&type_options)?;
/// ```
pub fn register_trait<T, Trait, Config>(type_name: &str) -> Result<()>
where
    T: Send + Sync + 'static,
    Trait: ?Sized + Send + Sync + 'static,
    Config: DeserializeOwned + Clone + Send + Sync + 'static,
    T: From<Config>,
    Box<T>: Into<Box<Trait>>,
{
    let type_name = type_name.to_string();
    let trait_id = TypeId::of::<Trait>();

    let constructor: TraitConstructor = Arc::new(move |value| {
        // 未提供 options 时使用配置的默认值
        let value = if value.is_null() {
            JsonValue::Object(Default::default())
        } else {
            value
        };
        let config: Config = serde_json::from_value(value)?;
        let trait_object: Box<Trait> = Box::new(T::from(config)).into();
        // 将 Box<dyn Trait> 包装成 Box<dyn Any>
        Ok(Box::new(trait_object) as Box<dyn Any + Send + Sync>)
    });

    let mut registry = TRAIT_REGISTRY
        .write()
        .map_err(|_| anyhow!("Failed to acquire write lock"))?;
    registry
        .entry(trait_id)
        .or_insert_with(HashMap::new)
        .insert(type_name, constructor);

    Ok(())
}

/// 判断某个名称是否已注册为指定 Trait 的实现
pub fn is_trait_registered<Trait>(type_name: &str) -> bool
where
    Trait: ?Sized + 'static,
{
    TRAIT_REGISTRY
        .read()
        .map(|registry| {
            registry
                .get(&TypeId::of::<Trait>())
                .map_or(false, |impls| impls.contains_key(type_name))
        })
        .unwrap_or(false)
}

/// 根据 TypeOptions 创建 trait object
///
/// # 示例
/// ```ignore
/// let type_options = TypeOptions::from_json(r#"{"type": "ConsoleDriver", "options": {}}"#)?;
/// let driver: Box<dyn LogDriver> = create_trait_from_type_options(&type_options)?;
/// ```
pub fn create_trait_from_type_options<Trait>(type_options: &TypeOptions) -> Result<Box<Trait>>
where
    Trait: ?Sized + Send + Sync + 'static,
{
    let trait_id = TypeId::of::<Trait>();
    let constructor = {
        let registry = TRAIT_REGISTRY
            .read()
            .map_err(|_| anyhow!("Failed to acquire read lock"))?;

        registry
            .get(&trait_id)
            .ok_or_else(|| anyhow!("No implementations registered for trait"))?
            .get(&type_options.type_name)
            .cloned()
            .ok_or_else(|| {
                anyhow!(
                    "Type '{}' not registered for this trait",
                    type_options.type_name
                )
            })?
    };

    let any_box = constructor(type_options.options.clone())?;

    // 从 Box<dyn Any> 中取回 Box<dyn Trait>
    any_box
        .downcast::<Box<Trait>>()
        .map(|boxed| *boxed)
        .map_err(|_| anyhow!("Failed to downcast to target trait type"))
}
