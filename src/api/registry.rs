//! Per-API metadata and return-code casting.

use crate::constants::{ApiFamily, ApiType};
use crate::error::{PhosError, Result};
use std::collections::HashMap;

// CUDA runtime / driver codes
const CUDA_SUCCESS: i32 = 0;
const CUDA_ERROR_INVALID_VALUE: i32 = 1;
const CUDA_ERROR_INVALID_HANDLE: i32 = 400;
const CUDA_ERROR_NOT_SUPPORTED: i32 = 801;
const CUDA_ERROR_UNKNOWN: i32 = 999;

// cuBLAS status codes
const CUBLAS_STATUS_SUCCESS: i32 = 0;
const CUBLAS_STATUS_INVALID_VALUE: i32 = 7;
const CUBLAS_STATUS_EXECUTION_FAILED: i32 = 13;
const CUBLAS_STATUS_INTERNAL_ERROR: i32 = 14;
const CUBLAS_STATUS_NOT_SUPPORTED: i32 = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiMeta {
    pub api_id: u64,
    pub name: &'static str,
    pub api_type: ApiType,
    pub family: ApiFamily,
}

impl ApiMeta {
    pub const fn new(api_id: u64, name: &'static str, api_type: ApiType, family: ApiFamily) -> Self {
        Self {
            api_id,
            name,
            api_type,
            family,
        }
    }
}

/// Metadata for every API the runtime intercepts, populated once at startup
#[derive(Debug, Clone, Default)]
pub struct ApiRegistry {
    metas: HashMap<u64, ApiMeta>,
}

impl ApiRegistry {
    pub fn from_metas(metas: impl IntoIterator<Item = ApiMeta>) -> Self {
        Self {
            metas: metas.into_iter().map(|meta| (meta.api_id, meta)).collect(),
        }
    }

    pub fn get(&self, api_id: u64) -> Option<&ApiMeta> {
        self.metas.get(&api_id)
    }

    pub fn len(&self) -> usize {
        self.metas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metas.is_empty()
    }

    /// Map a parse result into the return-code space of `family`
    pub fn cast_retval(result: &Result<()>, family: ApiFamily) -> i32 {
        match family {
            ApiFamily::CudaRuntime | ApiFamily::CudaDriver => match result {
                Ok(()) => CUDA_SUCCESS,
                Err(PhosError::PreconditionFailed(_)) => CUDA_ERROR_INVALID_VALUE,
                Err(PhosError::NotFound(_)) => CUDA_ERROR_INVALID_HANDLE,
                Err(PhosError::Unsupported(_)) => CUDA_ERROR_NOT_SUPPORTED,
                Err(PhosError::DriverError { code, .. }) => *code,
                Err(_) => CUDA_ERROR_UNKNOWN,
            },
            ApiFamily::CuBlas => match result {
                Ok(()) => CUBLAS_STATUS_SUCCESS,
                Err(PhosError::PreconditionFailed(_)) => CUBLAS_STATUS_INVALID_VALUE,
                Err(PhosError::Unsupported(_)) => CUBLAS_STATUS_NOT_SUPPORTED,
                Err(PhosError::DriverError { .. }) => CUBLAS_STATUS_EXECUTION_FAILED,
                Err(_) => CUBLAS_STATUS_INTERNAL_ERROR,
            },
            ApiFamily::Internal => match result {
                Ok(()) => 0,
                Err(_) => -1,
            },
        }
    }
}
