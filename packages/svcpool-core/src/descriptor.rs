//! Immutable service and operation descriptors, and the fluent builders that
//! produce them.
//!
//! An [`OperationDescriptor`] carries its executable as a closure bound when
//! the descriptor is built against a concrete facade type, so dispatch is a
//! table lookup rather than a runtime method search.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::DescriptorError;
use crate::types::{InterfaceType, Value, ValueType};

/// Bound callable for one operation.
///
/// Receives the leased instance (a boxed facade erased to `dyn Any`) and the
/// already-fitted argument list.
pub type Executable =
    Arc<dyn Fn(&mut (dyn Any + Send + 'static), &[Value]) -> anyhow::Result<Value> + Send + Sync>;

// ---------------------------------------------------------------------------
// OperationDescriptor
// ---------------------------------------------------------------------------

/// Description of one callable operation of a service.
///
/// Equality is structural over the name and the declared types; the bound
/// executable does not take part in it.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescriptor {
    name: String,
    parameter_type: ValueType,
    extra_parameter_types: Vec<ValueType>,
    result_type: ValueType,
    #[serde(skip)]
    executable: Option<Executable>,
}

impl OperationDescriptor {
    /// Starts building an operation with the given name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> OperationBuilder {
        OperationBuilder::default().name(name)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type of the first parameter, `Void` for operations without parameters.
    #[must_use]
    pub fn parameter_type(&self) -> ValueType {
        self.parameter_type
    }

    #[must_use]
    pub fn extra_parameter_types(&self) -> &[ValueType] {
        &self.extra_parameter_types
    }

    #[must_use]
    pub fn result_type(&self) -> ValueType {
        self.result_type
    }

    #[must_use]
    pub fn has_executable(&self) -> bool {
        self.executable.is_some()
    }

    /// Number of formal parameters the bound executable declares.
    #[must_use]
    pub fn arity(&self) -> usize {
        if self.parameter_type.is_void() {
            0
        } else {
            1 + self.extra_parameter_types.len()
        }
    }

    /// Whether `other` declares the same name and parameter types, i.e. would
    /// be indistinguishable to the resolver.
    #[must_use]
    pub fn same_signature(&self, other: &Self) -> bool {
        self.name == other.name
            && self.parameter_type == other.parameter_type
            && self.extra_parameter_types == other.extra_parameter_types
    }

    /// Returns a copy bound to `executable`.
    #[must_use]
    pub fn with_executable(mut self, executable: Executable) -> Self {
        self.executable = Some(executable);
        self
    }

    /// Runs the bound executable against `instance`.
    ///
    /// # Errors
    ///
    /// Returns an error if no executable is bound, or whatever the executable
    /// itself returns.
    pub fn invoke(
        &self,
        instance: &mut (dyn Any + Send + 'static),
        arguments: &[Value],
    ) -> anyhow::Result<Value> {
        match &self.executable {
            Some(executable) => executable(instance, arguments),
            None => Err(anyhow::anyhow!("no executable bound for operation {self}")),
        }
    }
}

impl PartialEq for OperationDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.same_signature(other) && self.result_type == other.result_type
    }
}

impl Eq for OperationDescriptor {}

impl fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("name", &self.name)
            .field("parameter_type", &self.parameter_type)
            .field("extra_parameter_types", &self.extra_parameter_types)
            .field("result_type", &self.result_type)
            .field("bound", &self.executable.is_some())
            .finish()
    }
}

impl fmt::Display for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        if !self.parameter_type.is_void() {
            write!(f, "{}", self.parameter_type)?;
            for extra in &self.extra_parameter_types {
                write!(f, ", {extra}")?;
            }
        }
        write!(f, ") -> {}", self.result_type)
    }
}

// ---------------------------------------------------------------------------
// OperationBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`OperationDescriptor`].
#[derive(Clone, Default)]
pub struct OperationBuilder {
    name: String,
    parameter_type: ValueType,
    extra_parameter_types: Vec<ValueType>,
    result_type: ValueType,
    executable: Option<Executable>,
}

impl OperationBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn parameter(mut self, parameter_type: ValueType) -> Self {
        self.parameter_type = parameter_type;
        self
    }

    #[must_use]
    pub fn parameter_extra(mut self, types: impl IntoIterator<Item = ValueType>) -> Self {
        self.extra_parameter_types = types.into_iter().collect();
        self
    }

    #[must_use]
    pub fn result(mut self, result_type: ValueType) -> Self {
        self.result_type = result_type;
        self
    }

    /// Binds a pre-erased executable.
    #[must_use]
    pub fn executable(mut self, executable: Executable) -> Self {
        self.executable = Some(executable);
        self
    }

    /// Binds `call` as the executable for instances of facade `I`.
    ///
    /// The pooled instance must have been produced as `Box<I>` (see
    /// [`crate::into_instance`]); any other instance fails the call.
    #[must_use]
    pub fn bind<I, F>(self, call: F) -> Self
    where
        I: ?Sized + 'static,
        F: Fn(&mut I, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let executable: Executable = Arc::new(
            move |instance: &mut (dyn Any + Send + 'static), arguments: &[Value]| {
                let Some(service) = instance.downcast_mut::<Box<I>>() else {
                    anyhow::bail!("instance does not implement {}", std::any::type_name::<I>());
                };
                call(service.as_mut(), arguments)
            },
        );
        self.executable(executable)
    }

    /// Builds the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::MissingOperationName`] if no name was set.
    pub fn build(self) -> Result<OperationDescriptor, DescriptorError> {
        if self.name.is_empty() {
            return Err(DescriptorError::MissingOperationName);
        }
        Ok(OperationDescriptor {
            name: self.name,
            parameter_type: self.parameter_type,
            extra_parameter_types: self.extra_parameter_types,
            result_type: self.result_type,
            executable: self.executable,
        })
    }
}

// ---------------------------------------------------------------------------
// ServiceDescriptor
// ---------------------------------------------------------------------------

/// Description of a registrable service: id, facade type and operations.
///
/// Operations keep their declaration order, which is the order the resolver
/// tries overloads in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    id: String,
    interface: InterfaceType,
    operations: Vec<OperationDescriptor>,
}

impl ServiceDescriptor {
    /// Creates a descriptor, checking its invariants.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::EmptyServiceId`] for an empty id and
    /// [`DescriptorError::DuplicateOperation`] when two operations share a
    /// name and parameter types.
    pub fn new(
        id: impl Into<String>,
        interface: InterfaceType,
        operations: Vec<OperationDescriptor>,
    ) -> Result<Self, DescriptorError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DescriptorError::EmptyServiceId);
        }
        for (index, operation) in operations.iter().enumerate() {
            if operations[..index]
                .iter()
                .any(|earlier| earlier.same_signature(operation))
            {
                return Err(DescriptorError::DuplicateOperation {
                    signature: operation.to_string(),
                });
            }
        }
        Ok(Self {
            id,
            interface,
            operations,
        })
    }

    #[must_use]
    pub fn builder() -> ServiceBuilder {
        ServiceBuilder::new()
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn interface(&self) -> InterfaceType {
        self.interface
    }

    #[must_use]
    pub fn operations(&self) -> &[OperationDescriptor] {
        &self.operations
    }

    /// Distinct operation names in declaration order.
    #[must_use]
    pub fn operation_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for operation in &self.operations {
            if !names.contains(&operation.name()) {
                names.push(operation.name());
            }
        }
        names
    }
}

// ---------------------------------------------------------------------------
// ServiceInterface
// ---------------------------------------------------------------------------

/// Facade types that describe their own operations.
///
/// Implemented on the facade itself (typically a trait object such as
/// `dyn PeriodicTable`) so [`ServiceBuilder::describe`] can populate a
/// descriptor without an explicit operation list.
pub trait ServiceInterface: 'static {
    /// The facade's operations, with executables bound.
    ///
    /// # Errors
    ///
    /// Returns an error if any operation is malformed.
    fn operations() -> Result<Vec<OperationDescriptor>, DescriptorError>;
}

// ---------------------------------------------------------------------------
// ServiceBuilder
// ---------------------------------------------------------------------------

type DerivedOperations = fn() -> Result<Vec<OperationDescriptor>, DescriptorError>;

/// Fluent builder for [`ServiceDescriptor`].
///
/// When no id is given the interface's canonical name is used. When no
/// operations are given and the interface was set through
/// [`describe`](Self::describe), the interface's own operations are used.
#[derive(Default)]
pub struct ServiceBuilder {
    id: Option<String>,
    interface: Option<InterfaceType>,
    operations: Vec<OperationDescriptor>,
    derived: Option<DerivedOperations>,
}

impl ServiceBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the facade type instances must implement.
    #[must_use]
    pub fn interface<I: ?Sized + 'static>(mut self) -> Self {
        self.interface = Some(InterfaceType::of::<I>());
        self
    }

    #[must_use]
    pub fn interface_type(mut self, interface: InterfaceType) -> Self {
        self.interface = Some(interface);
        self
    }

    /// Sets the facade type and falls back to its self-described operations.
    #[must_use]
    pub fn describe<I: ServiceInterface + ?Sized>(mut self) -> Self {
        self.interface = Some(InterfaceType::of::<I>());
        self.derived = Some(I::operations);
        self
    }

    #[must_use]
    pub fn operation(mut self, operation: OperationDescriptor) -> Self {
        self.operations.push(operation);
        self
    }

    #[must_use]
    pub fn operations(mut self, operations: impl IntoIterator<Item = OperationDescriptor>) -> Self {
        self.operations.extend(operations);
        self
    }

    /// Builds the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::MissingInterface`] when no interface was
    /// set, or any error from [`ServiceDescriptor::new`] or the interface's
    /// derived operations.
    pub fn build(self) -> Result<ServiceDescriptor, DescriptorError> {
        let explicit_id = self.id.filter(|id| !id.is_empty());
        let Some(interface) = self.interface else {
            return Err(DescriptorError::MissingInterface {
                service_id: explicit_id.unwrap_or_default(),
            });
        };
        let id = explicit_id.unwrap_or_else(|| interface.name().to_string());
        let operations = match self.derived {
            Some(derive) if self.operations.is_empty() => derive()?,
            _ => self.operations,
        };
        ServiceDescriptor::new(id, interface, operations)
    }
}

impl From<&ServiceDescriptor> for ServiceBuilder {
    fn from(descriptor: &ServiceDescriptor) -> Self {
        Self {
            id: Some(descriptor.id.clone()),
            interface: Some(descriptor.interface),
            operations: descriptor.operations.clone(),
            derived: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
