//! Response classification
//!
//! Turns a fully read response into the descriptor's output or a
//! [`DispatchError`]. A non-success status is always an API error, whatever
//! the body looks like.

use tracing::debug;

use crate::http::error::{ApiError, DispatchError};
use crate::http::request::RequestDescriptor;
use crate::http::transport::RawResponse;

/// Classify `response` for `descriptor`
pub fn classify<D>(descriptor: &D, response: RawResponse) -> Result<D::Output, DispatchError>
where
    D: RequestDescriptor + ?Sized,
{
    let url = descriptor.url();

    if descriptor.is_success(response.status) {
        return descriptor
            .parse_success(&response.body)
            .map_err(|source| DispatchError::ResponseParse {
                url: url.to_string(),
                source,
            });
    }

    let status_code = response.status.as_u16();
    let error = match ApiError::from_body(&response.body, status_code) {
        Ok(error) => error,
        Err(e) => {
            debug!(url = %url, status = status_code, error = %e, "Unreadable error body");
            ApiError::invalid_format(&response.body, status_code)
        }
    };

    Err(DispatchError::api_with_reason(
        url,
        response.status,
        response.reason_phrase(),
        error,
    ))
}
