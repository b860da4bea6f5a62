//! `multipart/mixed` batch payloads.

mod multipart;
mod reader;

pub use reader::{ODataBatchOperationMessage, ODataBatchReader, ODataBatchReaderState};

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::error::ErrorKind;
    use crate::message::MediaType;
    use crate::settings::ODataReaderSettings;

    const REQUEST: &str = "--batch\r\n\
Content-Type: multipart/mixed; boundary=cs\r\n\
\r\n\
--cs\r\n\
Content-Type: application/http\r\n\
Content-ID: 1\r\n\
\r\n\
POST http://host/Orders HTTP/1.1\r\n\
Content-Type: application/json\r\n\
\r\n\
{\"Id\":1}\r\n\
--cs\r\n\
Content-Type: application/http\r\n\
Content-ID: 2\r\n\
\r\n\
PATCH http://host/Orders(1) HTTP/1.1\r\n\
\r\n\
{}\r\n\
--cs--\r\n\
--batch\r\n\
Content-Type: application/http\r\n\
\r\n\
GET http://host/Orders HTTP/1.1\r\n\
\r\n\
\r\n\
--batch--\r\n";

    fn reader(body: &str, is_response: bool, settings: ODataReaderSettings) -> ODataBatchReader {
        let media = MediaType::parse("multipart/mixed; boundary=batch").unwrap();
        ODataBatchReader::new(body.as_bytes().to_vec(), &media, settings, is_response).unwrap()
    }

    #[test]
    fn changeset_and_top_level_operation() {
        use ODataBatchReaderState::*;
        let mut r = reader(REQUEST, false, ODataReaderSettings::default());
        let mut seen = Vec::new();
        while r.read().unwrap() {
            seen.push(r.state());
            if r.state() == Operation {
                let mut message = r.create_operation_message().unwrap();
                let mut body = String::new();
                message.stream_mut().read_to_string(&mut body).unwrap();
                seen_body(&message, &body);
            }
        }
        assert_eq!(
            seen,
            [ChangesetStart, Operation, Operation, ChangesetEnd, Operation]
        );
        assert_eq!(r.state(), Completed);
    }

    fn seen_body(message: &ODataBatchOperationMessage, body: &str) {
        match message.method() {
            Some("POST") => {
                assert_eq!(body, "{\"Id\":1}");
                assert_eq!(message.content_id(), Some("1"));
                assert_eq!(message.content_type(), Some("application/json"));
            }
            Some("PATCH") => assert_eq!(body, "{}"),
            Some("GET") => assert_eq!(message.url(), Some("http://host/Orders")),
            other => panic!("unexpected method {other:?}"),
        }
    }

    #[test]
    fn duplicate_content_id_is_isolated() {
        let body = REQUEST.replace("Content-ID: 2", "Content-ID: 1");
        let mut r = reader(&body, false, ODataReaderSettings::default());
        assert!(r.read().unwrap());
        assert!(r.read().unwrap());
        let err = r.read().unwrap_err();
        assert!(matches!(err, crate::ODataReaderError::DuplicateContentId(ref id) if id == "1"));
        assert!(r.read().unwrap());
        assert_eq!(r.state(), ODataBatchReaderState::ChangesetEnd);
    }

    #[test]
    fn without_isolation_a_bad_part_is_fatal() {
        let body = REQUEST.replace("PATCH http://host/Orders(1) HTTP/1.1", "BOGUS");
        let settings = ODataReaderSettings {
            batch_part_failure_isolation: false,
            ..Default::default()
        };
        let mut r = reader(&body, false, settings);
        r.read().unwrap();
        r.read().unwrap();
        assert!(r.read().is_err());
        assert_eq!(r.state(), ODataBatchReaderState::Exception);
        assert_eq!(r.read().unwrap_err().kind(), ErrorKind::Usage);
    }

    #[test]
    fn responses_carry_status() {
        let body = "--batch\r\n\
Content-Type: application/http\r\n\
\r\n\
HTTP/1.1 404 Not Found\r\n\
Content-Type: application/json\r\n\
\r\n\
{\"error\":{\"code\":\"404\",\"message\":\"missing\"}}\r\n\
--batch--";
        let mut r = reader(body, true, ODataReaderSettings::default());
        assert!(r.read().unwrap());
        assert_eq!(r.operation().and_then(|m| m.status()), Some(404));
        assert!(!r.read().unwrap());
    }

    #[test]
    fn nested_changesets_are_rejected() {
        let body = "--batch\r\n\
Content-Type: multipart/mixed; boundary=cs\r\n\
\r\n\
--cs\r\n\
Content-Type: multipart/mixed; boundary=inner\r\n\
\r\n\
--inner--\r\n\
--cs--\r\n\
--batch--\r\n";
        let mut r = reader(body, false, ODataReaderSettings::default());
        assert!(r.read().unwrap());
        assert!(r.read().is_err());
        assert!(r.read().unwrap());
        assert_eq!(r.state(), ODataBatchReaderState::ChangesetEnd);
        assert!(!r.read().unwrap());
    }
}
