// =============================================================================
// VALIDATION MODULE
// =============================================================================
// Field-level checks applied before anything is written. Each check returns
// the FieldError to report, and the form-level helpers collect them into
// AppError::Validation so the client gets every problem at once.
// =============================================================================

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AppError, AppResult};
use crate::models::{
    CreateCategoryRequest, CreateLocationRequest, CreateProductRequest, CreateUserRequest,
    FieldError, UpdateProductRequest, UpdateUserRequest,
};

/// Letters (accented included), spaces and apostrophes
static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-ZáéíóúÁÉÍÓÚñÑüÜ\s']+$").expect("valid name regex"));

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});

pub const MIN_PASSWORD_LEN: usize = 6;
pub const EMPLOYEE_CODE_LEN: usize = 5;
pub const RECOVERY_CODE_LEN: usize = 6;

// -----------------------------------------------------------------------------
// PEOPLE
// -----------------------------------------------------------------------------

pub fn validate_name(name: &str) -> Option<FieldError> {
    if name.trim().is_empty() {
        return Some(FieldError::new("name", "Name is required"));
    }
    if !NAME_RE.is_match(name) {
        return Some(FieldError::new(
            "name",
            "Name can only contain letters and spaces",
        ));
    }
    if name.trim().chars().count() < 2 {
        return Some(FieldError::new(
            "name",
            "Name must be at least 2 characters",
        ));
    }
    None
}

/// Surname is optional, but when present it follows the name charset
pub fn validate_surname(surname: Option<&str>) -> Option<FieldError> {
    let surname = surname.filter(|s| !s.trim().is_empty())?;
    if !NAME_RE.is_match(surname) {
        return Some(FieldError::new(
            "surname",
            "Surname can only contain letters and spaces",
        ));
    }
    None
}

pub fn validate_email(email: &str) -> Option<FieldError> {
    let email = email.trim();
    if email.is_empty() {
        return Some(FieldError::new("email", "Email is required"));
    }
    if !EMAIL_RE.is_match(email) {
        return Some(FieldError::new("email", "Email format is not valid"));
    }
    if email.starts_with('.') || email.ends_with('.') {
        return Some(FieldError::new(
            "email",
            "Email cannot start or end with a dot",
        ));
    }
    if email.contains("..") {
        return Some(FieldError::new(
            "email",
            "Email cannot contain consecutive dots",
        ));
    }
    None
}

pub fn validate_email_match(email: &str, confirm: &str) -> Option<FieldError> {
    if confirm.trim().is_empty() {
        return Some(FieldError::new(
            "confirm_email",
            "You must confirm the email",
        ));
    }
    if email != confirm {
        return Some(FieldError::new("confirm_email", "Emails do not match"));
    }
    None
}

pub fn validate_new_user(req: &CreateUserRequest) -> AppResult<()> {
    collect([
        validate_name(&req.name),
        validate_surname(req.surname.as_deref()),
        validate_email(&req.email),
        validate_email_match(&req.email, &req.confirm_email),
    ])
}

pub fn validate_user_update(req: &UpdateUserRequest) -> AppResult<()> {
    collect([
        req.name.as_deref().and_then(validate_name),
        validate_surname(req.surname.as_deref()),
    ])
}

// -----------------------------------------------------------------------------
// PASSWORDS & CODES
// -----------------------------------------------------------------------------

pub fn validate_new_password(password: &str, confirm: &str) -> AppResult<()> {
    if password != confirm {
        return Err(AppError::invalid("confirm_password", "Passwords do not match"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::invalid(
            "new_password",
            "Password must be at least 6 characters",
        ));
    }
    Ok(())
}

fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.chars().all(|c| c.is_ascii_digit())
}

pub fn validate_employee_code(code: &str) -> Option<FieldError> {
    if code.trim().is_empty() {
        return Some(FieldError::new(
            "employee_code",
            "Employee code is required",
        ));
    }
    if !is_digits(code, EMPLOYEE_CODE_LEN) {
        return Some(FieldError::new(
            "employee_code",
            "Employee code must be 5 digits",
        ));
    }
    None
}

pub fn validate_recovery_code(code: &str) -> AppResult<()> {
    if !is_digits(code, RECOVERY_CODE_LEN) {
        return Err(AppError::invalid("code", "The code must be 6 digits"));
    }
    Ok(())
}

pub fn validate_count(employee_code: &str, physical_quantity: i32) -> AppResult<()> {
    collect([
        validate_employee_code(employee_code),
        (physical_quantity < 0).then(|| {
            FieldError::new(
                "physical_quantity",
                "Physical quantity must be a number greater than or equal to 0",
            )
        }),
    ])
}

// -----------------------------------------------------------------------------
// PRODUCTS & CATALOG
// -----------------------------------------------------------------------------

fn blank_if_present(field: &str, value: Option<&str>, message: &str) -> Option<FieldError> {
    value
        .filter(|v| v.trim().is_empty())
        .map(|_| FieldError::new(field, message))
}

fn negative_quantity(quantity: Option<i32>) -> Option<FieldError> {
    quantity
        .filter(|q| *q < 0)
        .map(|_| FieldError::new("quantity", "Quantity cannot be negative"))
}

pub fn validate_new_product(req: &CreateProductRequest) -> AppResult<()> {
    collect([
        blank_if_present("sku", req.sku.as_deref(), "Key cannot be blank"),
        req.name
            .trim()
            .is_empty()
            .then(|| FieldError::new("name", "Name is required")),
        negative_quantity(Some(req.quantity)),
    ])
}

pub fn validate_product_update(req: &UpdateProductRequest) -> AppResult<()> {
    collect([
        blank_if_present("sku", req.sku.as_deref(), "Key cannot be blank"),
        blank_if_present("name", req.name.as_deref(), "Name is required"),
        negative_quantity(req.quantity),
    ])
}

pub fn validate_category(req: &CreateCategoryRequest) -> AppResult<()> {
    collect([req
        .name
        .trim()
        .is_empty()
        .then(|| FieldError::new("name", "Name is required"))])
}

pub fn validate_location(req: &CreateLocationRequest) -> AppResult<()> {
    collect([
        req.code
            .trim()
            .is_empty()
            .then(|| FieldError::new("code", "Code is required")),
        req.aisle
            .trim()
            .is_empty()
            .then(|| FieldError::new("aisle", "Aisle is required")),
        req.level
            .trim()
            .is_empty()
            .then(|| FieldError::new("level", "Level is required")),
    ])
}

fn collect<const N: usize>(checks: [Option<FieldError>; N]) -> AppResult<()> {
    let errors: Vec<FieldError> = checks.into_iter().flatten().collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}
