use std::collections::HashMap;

use serde::Serialize;

use crate::error::AppError;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE: u64 = 10_000;
const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Copy)]
pub struct Filters {
    pub page: u64,
    pub page_size: u64,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Filters {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = HashMap::new();
        if self.page == 0 {
            errors.insert("page".to_string(), "must be greater than zero".to_string());
        }
        if self.page > MAX_PAGE {
            errors.insert("page".to_string(), "must be a maximum of 10,000".to_string());
        }
        if self.page_size == 0 {
            errors.insert(
                "page_size".to_string(),
                "must be greater than zero".to_string(),
            );
        }
        if self.page_size > MAX_PAGE_SIZE {
            errors.insert(
                "page_size".to_string(),
                "must be a maximum of 100".to_string(),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::validation(errors))
        }
    }
}

/// Pagination envelope accompanying every listing response.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Metadata {
    pub current_page: u64,
    pub page_size: u64,
    pub first_page: u64,
    pub last_page: u64,
    pub total_records: u64,
}

impl Metadata {
    pub fn calculate(total_records: u64, page: u64, page_size: u64) -> Self {
        if total_records == 0 {
            return Self {
                current_page: 0,
                page_size: 0,
                first_page: 0,
                last_page: 0,
                total_records: 0,
            };
        }

        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: total_records.div_ceil(page_size),
            total_records,
        }
    }
}
