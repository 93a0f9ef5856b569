pub use crate::{
    Args, Committed, Computed, Deps, Dispose, Effects, Equality, Extension, GlobalStore,
    Mutation, OnChangeOptions, Path, PathAccessor, Provider, ReadMode, Reader, Store,
    StoreBuilder, StoreContext, StoreError, Value, create_store_context, effect, observe,
    store, store_deferred,
};
