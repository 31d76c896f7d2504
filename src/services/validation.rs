use garde::Validate;

use crate::models::job::Job;
use crate::models::request::IngressRequest;

/// An ingress request with every field present and non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub method: String,
    pub url: String,
    pub location: String,
}

impl ValidatedRequest {
    /// Turn the request into a job with a fresh id.
    pub fn into_job(self) -> Job {
        Job::new(self.method, self.url, self.location)
    }
}

/// Check an ingress request before anything touches a queue.
///
/// Pure: no logging, no side effects. The location is only checked for
/// presence here; whether it names a known region is the dispatcher's call.
pub fn validate_request(request: &IngressRequest) -> Result<ValidatedRequest, ValidationError> {
    let (method, url, location) = match (&request.method, &request.url, &request.location) {
        (Some(method), Some(url), Some(location)) => (method, url, location),
        (None, _, _) => return Err(ValidationError::MissingField("method".into())),
        (_, None, _) => return Err(ValidationError::MissingField("url".into())),
        (_, _, None) => return Err(ValidationError::MissingField("location".into())),
    };

    if let Err(report) = request.validate() {
        let field = report
            .iter()
            .next()
            .map(|(path, _)| path.to_string())
            .unwrap_or_default();
        return Err(ValidationError::MissingField(field));
    }

    Ok(ValidatedRequest {
        method: method.clone(),
        url: url.clone(),
        location: location.clone(),
    })
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing or empty field: {0}")]
    MissingField(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> IngressRequest {
        IngressRequest {
            method: Some("GET".into()),
            url: Some("/api/v1/resource".into()),
            location: Some("USA".into()),
        }
    }

    #[test]
    fn test_complete_request_accepted() {
        let validated = validate_request(&complete()).unwrap();
        assert_eq!(validated.method, "GET");
        assert_eq!(validated.url, "/api/v1/resource");
        assert_eq!(validated.location, "USA");
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut no_method = complete();
        no_method.method = None;
        let mut no_url = complete();
        no_url.url = None;
        let mut no_location = complete();
        no_location.location = None;

        for (request, field) in [(no_method, "method"), (no_url, "url"), (no_location, "location")] {
            let err = validate_request(&request).unwrap_err();
            assert_eq!(err, ValidationError::MissingField(field.into()));
        }
    }

    #[test]
    fn test_empty_fields_rejected() {
        let mut empty_url = complete();
        empty_url.url = Some(String::new());
        assert!(matches!(
            validate_request(&empty_url),
            Err(ValidationError::MissingField(_))
        ));

        let mut empty_location = complete();
        empty_location.location = Some(String::new());
        assert!(validate_request(&empty_location).is_err());
    }

    #[test]
    fn test_unknown_location_still_valid() {
        let mut request = complete();
        request.location = Some("Mars".into());
        assert!(validate_request(&request).is_ok());
    }

    #[test]
    fn test_into_job_carries_fields() {
        let job = validate_request(&complete()).unwrap().into_job();
        assert_eq!(job.location, "USA");
        assert_eq!(job.method, "GET");
    }
}
