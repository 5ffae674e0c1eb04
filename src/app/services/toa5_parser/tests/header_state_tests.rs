//! Tests for the header block state machine

use super::super::error::ParseError;
use super::super::header_state::{CursorState, HeaderLayout, HeaderStateMachine, LineEvent};
use super::{feed_all, streaming_machine, toa5_header};

fn lines(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|l| l.to_string()).collect()
}

#[test]
fn test_initial_state_awaits_marker() {
    let machine = HeaderStateMachine::new(HeaderLayout::default());
    assert_eq!(machine.state(), CursorState::AwaitingMarker);
    assert!(machine.mapping().is_none());
}

#[test]
fn test_data_before_marker_is_rejected() {
    let mut machine = HeaderStateMachine::new(HeaderLayout::default());

    assert_eq!(
        machine.feed("2024-01-01 00:00:00,1,12.5"),
        Err(ParseError::NoMappingYet)
    );
    assert_eq!(machine.state(), CursorState::AwaitingMarker);
}

#[test]
fn test_full_header_cycle() {
    let mut machine = HeaderStateMachine::new(HeaderLayout::default());
    let header = toa5_header(&["TIMESTAMP", "RECORD", "BattV_Min"]);

    assert_eq!(machine.feed(&header[0]), Ok(LineEvent::Marker));
    assert_eq!(machine.state(), CursorState::InHeader { remaining: 3 });

    match machine.feed(&header[1]) {
        Ok(LineEvent::ColumnsDefined(mapping)) => {
            assert_eq!(mapping.names(), ["TIMESTAMP", "RECORD", "BattV_Min"]);
        }
        other => panic!("Expected ColumnsDefined, got {:?}", other),
    }
    assert_eq!(machine.state(), CursorState::InHeader { remaining: 2 });

    assert_eq!(machine.feed(&header[2]), Ok(LineEvent::HeaderSkipped));
    assert_eq!(machine.state(), CursorState::InHeader { remaining: 1 });

    assert_eq!(machine.feed(&header[3]), Ok(LineEvent::HeaderSkipped));
    assert_eq!(machine.state(), CursorState::Streaming);

    match machine.feed(r#""2024-01-01 00:00:00",0,12.6"#) {
        Ok(LineEvent::Data { fields, mapping }) => {
            assert_eq!(fields, vec!["2024-01-01 00:00:00", "0", "12.6"]);
            assert_eq!(mapping.position("BattV_Min"), Some(2));
        }
        other => panic!("Expected Data, got {:?}", other),
    }
}

#[test]
fn test_marker_resets_from_every_state() {
    let marker = r#""TOA5","Logger""#;

    // From AwaitingMarker
    let mut machine = HeaderStateMachine::new(HeaderLayout::default());
    assert_eq!(machine.feed(marker), Ok(LineEvent::Marker));
    assert_eq!(machine.state(), CursorState::InHeader { remaining: 3 });

    // From InHeader, mid-block
    machine.feed("A,B").unwrap();
    assert_eq!(machine.feed(marker), Ok(LineEvent::Marker));
    assert_eq!(machine.state(), CursorState::InHeader { remaining: 3 });
    assert!(machine.mapping().is_none());

    // From Streaming with an established mapping
    let mut machine = streaming_machine(&["A", "B"]);
    assert!(machine.mapping().is_some());
    assert_eq!(machine.feed(marker), Ok(LineEvent::Marker));
    assert_eq!(machine.state(), CursorState::InHeader { remaining: 3 });
    assert!(machine.mapping().is_none());
}

#[test]
fn test_restart_mid_stream_replaces_mapping() {
    let mut machine = streaming_machine(&["TIMESTAMP", "BattV_Min"]);
    assert!(matches!(machine.feed("x,12.1"), Ok(LineEvent::Data { .. })));

    let events = feed_all(&mut machine, &toa5_header(&["TIMESTAMP", "RECORD", "BattV_Avg"]));
    assert!(events.iter().all(Result::is_ok));

    let mapping = machine.mapping().unwrap();
    assert_eq!(mapping.names(), ["TIMESTAMP", "RECORD", "BattV_Avg"]);
    assert_eq!(mapping.position("BattV_Min"), None);
    assert_eq!(mapping.position("BattV_Avg"), Some(2));
}

#[test]
fn test_data_between_marker_and_names_is_not_data() {
    let mut machine = streaming_machine(&["A", "B"]);
    machine.feed(r#""TOA5""#).unwrap();

    // The next line is taken as the column names, never as data
    assert!(matches!(
        machine.feed("1,2"),
        Ok(LineEvent::ColumnsDefined(_))
    ));
}

#[test]
fn test_malformed_names_line_leaves_no_mapping() {
    let mut machine = HeaderStateMachine::new(HeaderLayout::default());
    machine.feed(r#""TOA5""#).unwrap();

    assert!(matches!(
        machine.feed(r#""TIMESTAMP,"RECORD""#),
        Err(ParseError::MalformedRow { .. })
    ));
    assert_eq!(machine.state(), CursorState::InHeader { remaining: 2 });

    machine.feed("units").unwrap();
    machine.feed("processing").unwrap();
    assert_eq!(machine.state(), CursorState::Streaming);
    assert_eq!(machine.feed("1,2"), Err(ParseError::NoMappingYet));
}

#[test]
fn test_blank_lines_do_not_count_as_header() {
    let mut machine = HeaderStateMachine::new(HeaderLayout::default());
    machine.feed(r#""TOA5""#).unwrap();

    assert_eq!(machine.feed(""), Ok(LineEvent::Blank));
    assert_eq!(machine.feed("   \r"), Ok(LineEvent::Blank));
    assert_eq!(machine.state(), CursorState::InHeader { remaining: 3 });

    assert!(matches!(
        machine.feed("A,B"),
        Ok(LineEvent::ColumnsDefined(_))
    ));
}

#[test]
fn test_malformed_data_row_keeps_streaming() {
    let mut machine = streaming_machine(&["A", "B"]);

    assert!(matches!(
        machine.feed(r#"1,"2"#),
        Err(ParseError::MalformedRow { .. })
    ));
    assert_eq!(machine.state(), CursorState::Streaming);
    assert!(matches!(machine.feed("1,2"), Ok(LineEvent::Data { .. })));
}

#[test]
fn test_names_on_third_line_layout() {
    // Block of four lines with an extra metadata line before the names
    let layout = HeaderLayout::default().with_block(4, 2);
    let mut machine = HeaderStateMachine::new(layout);

    let feed = lines(&[
        "TOA5,...",
        "h1",
        "GageMinV,Temp,Depth",
        "units",
        "2024-01-01 00:00:00,1,2",
    ]);
    let events = feed_all(&mut machine, &feed);

    assert_eq!(events[0], Ok(LineEvent::Marker));
    assert_eq!(events[1], Ok(LineEvent::HeaderSkipped));
    assert!(matches!(events[2], Ok(LineEvent::ColumnsDefined(_))));
    assert_eq!(events[3], Ok(LineEvent::HeaderSkipped));

    let data: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Ok(LineEvent::Data { fields, mapping }) => Some((fields.clone(), mapping.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(data.len(), 1);

    let (fields, mapping) = &data[0];
    assert_eq!(mapping.names(), ["GageMinV", "Temp", "Depth"]);
    assert_eq!(fields.len(), mapping.len());
}

#[test]
fn test_custom_marker() {
    let layout = HeaderLayout::default().with_marker("TOB1");
    let mut machine = HeaderStateMachine::new(layout);

    assert_eq!(machine.feed(r#""TOA5""#), Err(ParseError::NoMappingYet));
    assert_eq!(machine.feed(r#""TOB1""#), Ok(LineEvent::Marker));
}

#[test]
fn test_layout_validation() {
    assert!(HeaderLayout::default().validate().is_ok());
    assert!(HeaderLayout::default().with_marker("  ").validate().is_err());
    assert!(HeaderLayout::default().with_block(4, 0).validate().is_err());
    assert!(HeaderLayout::default().with_block(4, 4).validate().is_err());
    assert!(HeaderLayout::default().with_block(2, 1).validate().is_ok());
}
