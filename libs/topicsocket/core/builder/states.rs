/// Type-state markers for the builder pattern
///
/// These types are used to track which fields have been set
/// in the builder at compile-time, preventing invalid configurations.

use std::marker::PhantomData;

/// Marker trait for endpoint state
pub trait EndpointState {}

/// Endpoint host has not been set
pub struct NoEndpoint;
impl EndpointState for NoEndpoint {}

/// Endpoint host has been set
pub struct HasEndpoint;
impl EndpointState for HasEndpoint {}

/// Marker trait for token provider state
pub trait TokenState {}

/// Token provider has not been set
pub struct NoToken;
impl TokenState for NoToken {}

/// Token provider has been set
pub struct HasToken;
impl TokenState for HasToken {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<E, T> {
    _endpoint: PhantomData<E>,
    _token: PhantomData<T>,
}

impl<E, T> TypeState<E, T> {
    pub(crate) fn new() -> Self {
        Self {
            _endpoint: PhantomData,
            _token: PhantomData,
        }
    }
}

impl<E, T> Default for TypeState<E, T> {
    fn default() -> Self {
        Self::new()
    }
}
