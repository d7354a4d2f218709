//! Boundary validation of profile input.

use crate::auth::{AuthError, AuthResult, NewStudent, ProfileUpdate, Role, StudentProfile};

/// Upper bound on any free-form profile field
pub const MAX_FIELD_LEN: usize = 120;

const MAX_EMAIL_LEN: usize = 254;

/// Syntactic email check: one `@`, non-empty local part, dotted domain,
/// no whitespace. Returns the address lowercased.
pub fn normalize_email(email: &str) -> AuthResult<String> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::validation("email", "Email is required"));
    }
    if email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return Err(AuthError::validation("email", "Email address is not valid"));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(AuthError::validation("email", "Email address is not valid"));
    };

    let domain_ok = !domain.contains('@')
        && domain.contains('.')
        && domain
            .split('.')
            .all(|label| !label.is_empty() && !label.starts_with('-') && !label.ends_with('-'));

    if local.is_empty() || !domain_ok {
        return Err(AuthError::validation("email", "Email address is not valid"));
    }

    Ok(email.to_lowercase())
}

pub(crate) fn required(field: &str, value: &str) -> AuthResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AuthError::validation(field, format!("{field} is required")));
    }
    if value.chars().count() > MAX_FIELD_LEN {
        return Err(AuthError::validation(
            field,
            format!("{field} must be at most {MAX_FIELD_LEN} characters"),
        ));
    }
    Ok(value.to_string())
}

/// Validate a registration request into a trimmed profile and normalized email
pub fn validate_new_student(input: &NewStudent) -> AuthResult<(StudentProfile, String)> {
    let profile = StudentProfile {
        name: required("name", &input.name)?,
        class_name: required("class", &input.class_name)?,
        division: required("division", &input.division)?,
        parent_name: required("parentName", &input.parent_name)?,
        place: required("place", &input.place)?,
    };
    let email = normalize_email(&input.email)?;
    Ok((profile, email))
}

/// Validate a profile update for the given role, returning the trimmed update
pub fn validate_profile_update(role: Role, update: &ProfileUpdate) -> AuthResult<ProfileUpdate> {
    if update.is_empty() {
        return Err(AuthError::validation("profile", "No fields to update"));
    }

    if role == Role::Controller {
        let student_only = [
            ("class", &update.class_name),
            ("division", &update.division),
            ("parentName", &update.parent_name),
            ("place", &update.place),
        ];
        if let Some((field, _)) = student_only.iter().find(|(_, value)| value.is_some()) {
            return Err(AuthError::validation(
                *field,
                "Field does not apply to controller accounts",
            ));
        }
    }

    let check = |field: &str, value: &Option<String>| -> AuthResult<Option<String>> {
        value.as_deref().map(|v| required(field, v)).transpose()
    };

    Ok(ProfileUpdate {
        name: check("name", &update.name)?,
        class_name: check("class", &update.class_name)?,
        division: check("division", &update.division)?,
        parent_name: check("parentName", &update.parent_name)?,
        place: check("place", &update.place)?,
    })
}
