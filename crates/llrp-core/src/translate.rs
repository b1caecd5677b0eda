// ── Command translation ──
//
// Maps resource names plus positional parameters onto LLRP requests.
// Everything here is pure: a command that fails translation never
// touches the reader.

use llrp_api::{
    AccessSpec, AddAccessSpec, AddRoSpec, GetReaderCapabilities, GetReaderConfig, Request, RoSpec,
    SetReaderConfig,
};
use serde::de::DeserializeOwned;

use crate::error::CoreError;
use crate::model::{Action, CommandRequest, CommandValue, Resource};

/// The request that reads `resource`.
pub fn translate_read(resource: &str) -> Result<(Resource, Request), CoreError> {
    let parsed = parse_resource(resource)?;
    let request = match parsed {
        Resource::ReaderCapabilities => {
            Request::GetReaderCapabilities(GetReaderCapabilities::default())
        }
        Resource::ReaderConfig => Request::GetReaderConfig(GetReaderConfig::default()),
        Resource::RoSpec => Request::GetRoSpecs,
        Resource::AccessSpec => Request::GetAccessSpecs,
        Resource::ReaderEventNotification | Resource::RoAccessReport => {
            return Err(CoreError::validation(format!(
                "{parsed} is delivered as an async event and cannot be read"
            )));
        }
        Resource::RoSpecId | Resource::AccessSpecId | Resource::Action => {
            return Err(CoreError::validation(format!("{parsed} is write-only")));
        }
    };
    Ok((parsed, request))
}

/// The request that performs a write on `requests[0]` with `params`.
///
/// Parameters are checked both by position and by their resource tag.
pub fn translate_write(
    requests: &[CommandRequest],
    params: &[CommandValue],
) -> Result<(Resource, Request), CoreError> {
    let first = requests
        .first()
        .ok_or_else(|| CoreError::validation("missing requests"))?;
    let resource = parse_resource(&first.resource)?;

    let request = match resource {
        Resource::ReaderConfig => {
            let data = param(params, "SetReaderConfig", 0, Resource::ReaderConfig)?.as_str()?;
            Request::SetReaderConfig(from_json::<SetReaderConfig>(data)?)
        }
        // The payload is the inner spec, not the whole add request.
        Resource::RoSpec => {
            let data = param(params, "AddROSpec", 0, Resource::RoSpec)?.as_str()?;
            Request::AddRoSpec(AddRoSpec {
                ro_spec: from_json::<RoSpec>(data)?,
            })
        }
        Resource::AccessSpec => {
            let data = param(params, "AddAccessSpec", 0, Resource::AccessSpec)?.as_str()?;
            Request::AddAccessSpec(AddAccessSpec {
                access_spec: from_json::<AccessSpec>(data)?,
            })
        }
        Resource::RoSpecId => {
            let (action, id) = lifecycle(params, Resource::RoSpecId, Resource::RoSpec)?;
            match action {
                Action::Enable => Request::EnableRoSpec { ro_spec_id: id },
                Action::Disable => Request::DisableRoSpec { ro_spec_id: id },
                Action::Start => Request::StartRoSpec { ro_spec_id: id },
                Action::Stop => Request::StopRoSpec { ro_spec_id: id },
                Action::Delete => Request::DeleteRoSpec { ro_spec_id: id },
            }
        }
        Resource::AccessSpecId => {
            let (action, id) = lifecycle(params, Resource::AccessSpecId, Resource::AccessSpec)?;
            match action {
                Action::Enable => Request::EnableAccessSpec { access_spec_id: id },
                Action::Disable => Request::DisableAccessSpec { access_spec_id: id },
                Action::Delete => Request::DeleteAccessSpec { access_spec_id: id },
                Action::Start | Action::Stop => {
                    return Err(CoreError::UnknownAction {
                        resource: resource.to_string(),
                        action: action.to_string(),
                    });
                }
            }
        }
        Resource::ReaderCapabilities
        | Resource::ReaderEventNotification
        | Resource::RoAccessReport
        | Resource::Action => {
            return Err(CoreError::validation(format!("{resource} is read-only")));
        }
    };
    Ok((resource, request))
}

fn parse_resource(name: &str) -> Result<Resource, CoreError> {
    name.parse().map_err(|_| CoreError::UnknownResource {
        name: name.to_owned(),
    })
}

/// `params[idx]`, provided it exists and is tagged `key`.
fn param<'a>(
    params: &'a [CommandValue],
    op: &str,
    idx: usize,
    key: Resource,
) -> Result<&'a CommandValue, CoreError> {
    let Some(cv) = params.get(idx) else {
        return Err(CoreError::validation(format!(
            "{op} needs at least {} parameters, but got {}",
            idx + 1,
            params.len()
        )));
    };
    if cv.resource != key.to_string() {
        return Err(CoreError::validation(format!(
            "{op} expected parameter {idx}: {key}, but got {}",
            cv.resource
        )));
    }
    Ok(cv)
}

/// Parse `[id, action]` for an identified-spec operation.
fn lifecycle(
    params: &[CommandValue],
    id_key: Resource,
    spec: Resource,
) -> Result<(Action, u32), CoreError> {
    if params.len() != 2 {
        return Err(CoreError::validation(format!(
            "expected 2 parameters for {id_key} op, but got {}",
            params.len()
        )));
    }
    let action = param(params, &spec.to_string(), 1, Resource::Action)?.as_str()?;
    let id = param(params, &format!("{action}{spec}"), 0, id_key)?.as_u32()?;
    let parsed = action.parse().map_err(|_| CoreError::UnknownAction {
        resource: id_key.to_string(),
        action: action.to_owned(),
    })?;
    Ok((parsed, id))
}

fn from_json<T: DeserializeOwned>(data: &str) -> Result<T, CoreError> {
    serde_json::from_str(data)
        .map_err(|e| CoreError::validation(format!("failed to unmarshal request: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write(resource: &str, params: &[CommandValue]) -> Result<(Resource, Request), CoreError> {
        translate_write(&[CommandRequest::new(resource)], params)
    }

    fn id_and_action(id_key: &str, id: u32, action: &str) -> Vec<CommandValue> {
        vec![
            CommandValue::uint32(id_key, id),
            CommandValue::string("Action", action),
        ]
    }

    #[test]
    fn reads_map_to_fixed_requests() {
        assert_eq!(
            translate_read("ReaderCapabilities").unwrap(),
            (
                Resource::ReaderCapabilities,
                Request::GetReaderCapabilities(GetReaderCapabilities::default())
            )
        );
        assert_eq!(translate_read("ROSpec").unwrap().1, Request::GetRoSpecs);
        assert_eq!(translate_read("AccessSpec").unwrap().1, Request::GetAccessSpecs);
    }

    #[test]
    fn event_only_resources_cannot_be_read() {
        for name in ["ROAccessReport", "ReaderEventNotification", "ROSpecID"] {
            assert!(translate_read(name).unwrap_err().is_validation(), "{name}");
        }
        assert!(matches!(
            translate_read("Firmware"),
            Err(CoreError::UnknownResource { .. })
        ));
    }

    #[test]
    fn rospec_lifecycle_actions() {
        let cases = [
            ("Enable", Request::EnableRoSpec { ro_spec_id: 42 }),
            ("Disable", Request::DisableRoSpec { ro_spec_id: 42 }),
            ("Start", Request::StartRoSpec { ro_spec_id: 42 }),
            ("Stop", Request::StopRoSpec { ro_spec_id: 42 }),
            ("Delete", Request::DeleteRoSpec { ro_spec_id: 42 }),
        ];
        for (action, expected) in cases {
            let (resource, request) = write("ROSpecID", &id_and_action("ROSpecID", 42, action)).unwrap();
            assert_eq!(resource, Resource::RoSpecId);
            assert_eq!(request, expected);
        }
    }

    #[test]
    fn unknown_action_is_rejected() {
        let err = write("ROSpecID", &id_and_action("ROSpecID", 42, "Bogus")).unwrap_err();
        assert_eq!(err.to_string(), r#"unknown ROSpecID action: "Bogus""#);
    }

    #[test]
    fn access_specs_cannot_be_started() {
        let err = write("AccessSpecID", &id_and_action("AccessSpecID", 7, "Start")).unwrap_err();
        assert!(matches!(err, CoreError::UnknownAction { .. }));

        let (_, request) = write("AccessSpecID", &id_and_action("AccessSpecID", 7, "Enable")).unwrap();
        assert_eq!(request, Request::EnableAccessSpec { access_spec_id: 7 });
    }

    #[test]
    fn lifecycle_needs_exactly_two_parameters() {
        let err = write("ROSpecID", &[CommandValue::uint32("ROSpecID", 42)]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: expected 2 parameters for ROSpecID op, but got 1"
        );
    }

    #[test]
    fn parameters_are_checked_by_tag() {
        let swapped = vec![
            CommandValue::string("Action", "Start"),
            CommandValue::uint32("ROSpecID", 42),
        ];
        let err = write("ROSpecID", &swapped).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: ROSpec expected parameter 1: Action, but got ROSpecID"
        );
    }

    #[test]
    fn numeric_ids_may_arrive_as_text() {
        let params = vec![
            CommandValue::string("ROSpecID", "42"),
            CommandValue::string("Action", "Start"),
        ];
        assert_eq!(
            write("ROSpecID", &params).unwrap().1,
            Request::StartRoSpec { ro_spec_id: 42 }
        );
    }

    #[test]
    fn missing_parameter_is_reported() {
        let err = write("ReaderConfig", &[]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: SetReaderConfig needs at least 1 parameters, but got 0"
        );
    }

    #[test]
    fn rospec_json_fills_the_inner_spec() {
        let json = r#"{"ROSpecID": 9, "Priority": 2, "CurrentState": "Disabled"}"#;
        let (_, request) = write("ROSpec", &[CommandValue::string("ROSpec", json)]).unwrap();
        let Request::AddRoSpec(add) = request else {
            panic!("expected AddROSpec, got {request:?}");
        };
        assert_eq!(add.ro_spec.id, 9);
        assert_eq!(add.ro_spec.priority, 2);
    }

    #[test]
    fn reader_config_json_fills_the_whole_request() {
        let json = r#"{"ResetToFactoryDefaults": true}"#;
        let (_, request) = write("ReaderConfig", &[CommandValue::string("ReaderConfig", json)]).unwrap();
        assert_eq!(
            request,
            Request::SetReaderConfig(SetReaderConfig {
                reset_to_factory_defaults: true,
                parameters: Vec::new(),
            })
        );
    }

    #[test]
    fn malformed_json_is_a_validation_error() {
        let err = write("ROSpec", &[CommandValue::string("ROSpec", "{not json")]).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("failed to unmarshal request"));
    }

    #[test]
    fn empty_write_is_rejected() {
        assert!(translate_write(&[], &[]).unwrap_err().is_validation());
        assert!(write("ROAccessReport", &[]).unwrap_err().is_validation());
    }
}
