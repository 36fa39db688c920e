//! Native JP2 container reading.
//!
//! Just enough of the JP2/JPX file format to answer metadata and XML queries
//! without starting a decoder.

mod boxes;
mod codestream;

pub use boxes::{
    count_compositing_layers, find_codestream, xml_boxes, BoxIter, BoxType, Jp2Box,
    BOX_CODESTREAM, BOX_COMPOSITING_LAYER, BOX_FILE_TYPE, BOX_JP2_HEADER, BOX_SIGNATURE, BOX_XML,
};
pub use codestream::{parse_main_header, CodestreamHeader};

use crate::error::Jp2Error;

use super::ImageMetadata;

/// Read image metadata from a complete JP2 file held in memory.
pub fn read_metadata(data: &[u8]) -> Result<ImageMetadata, Jp2Error> {
    let header = parse_main_header(find_codestream(data)?)?;
    let compositing_layers = count_compositing_layers(data)?;

    Ok(ImageMetadata {
        width: header.width,
        height: header.height,
        levels: header.levels,
        bit_depth: header.bit_depth,
        channels: header.components,
        quality_layers: header.quality_layers,
        compositing_layers,
    })
}
