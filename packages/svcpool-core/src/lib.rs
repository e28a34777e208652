//! `svcpool` core: dynamic values, service and operation descriptors, and the
//! overload resolver used to dispatch calls by operation name.

pub mod descriptor;
pub mod error;
pub mod resolver;
pub mod types;

pub use descriptor::{
    Executable, OperationBuilder, OperationDescriptor, ServiceBuilder, ServiceDescriptor,
    ServiceInterface,
};
pub use error::{DescriptorError, ResolveError};
pub use resolver::{fit_arguments, normalize_arguments, ArityPolicy, FittedArguments, OperationTable};
pub use types::{into_instance, Instance, InterfaceType, Value, ValueType};
