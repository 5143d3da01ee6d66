//! 领域层：运行配置值类型、领域描述文件、国家查找表

pub mod countries;
pub mod descriptor;
pub mod run_config;

pub use countries::{country_name, language_name, lookup_country, search_params, CountryInfo};
pub use descriptor::{discover_descriptors, CountryConfig, DescriptorError, DomainDescriptor};
pub use run_config::RunConfig;
