//! Framing of readings into addressed, encoded messages

use crate::transport::WireLayout;
use sensorflow_shared::{CodecError, EncodedMessage, IngestRecord, PayloadCodec, Reading};

/// One message ready for delivery
#[derive(Debug)]
pub struct Outbound {
    /// Topic or URL
    pub target: String,
    pub payload: Result<EncodedMessage, CodecError>,
}

/// Frame a sensor reading and its energy reading for `layout`
///
/// Topic layouts carry two messages; ingest layouts carry one record that
/// embeds the energy value.
pub fn frame(
    layout: &WireLayout,
    codec: &PayloadCodec,
    reading: &Reading,
    energy: &Reading,
) -> Vec<Outbound> {
    match layout {
        WireLayout::Topics { base_topic } => [reading, energy]
            .into_iter()
            .map(|r| Outbound {
                target: r.topic(base_topic),
                payload: codec.encode(r),
            })
            .collect(),
        WireLayout::Ingest { endpoint } => vec![Outbound {
            target: endpoint.clone(),
            payload: codec.encode(&IngestRecord::new(reading, energy)),
        }],
    }
}
