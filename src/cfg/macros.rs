//! 组件构造相关的宏定义

/// 为组件配置类型实现 `From<Config>`，调用 `Type::new(config)`
///
/// 用法：`impl_from!(FileProviderConfig => FileProvider)`
#[macro_export]
macro_rules! impl_from {
    ($config_type:ty => $target_type:ty) => {
        impl From<$config_type> for $target_type {
            fn from(config: $config_type) -> Self {
                <$target_type>::new(config)
            }
        }
    };
}
