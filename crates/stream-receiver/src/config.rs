use h264_nal::RewriteOptions;

/// Receiver configuration.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// RTP clock rate in Hz, used to derive NTP time from sender reports.
    pub clock_rate: u32,
    /// Discard AUs that arrive before the codec configuration instead of
    /// halting.
    pub wait_for_sync: bool,
    /// Deliver AUs with missing fragments (classified as frame lost).
    pub output_incomplete_au: bool,
    pub filter_out_sps_pps: bool,
    pub filter_out_sei: bool,
    pub replace_start_codes_with_nalu_size: bool,
    /// Feed SPS/PPS found inside AUs to the config gate while unconfigured.
    pub extract_in_band_parameter_sets: bool,
    /// Upper bound on a single SPS or PPS, in bytes.
    pub max_parameter_set_size: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            clock_rate: 90_000,
            wait_for_sync: false,
            output_incomplete_au: false,
            filter_out_sps_pps: false,
            filter_out_sei: false,
            replace_start_codes_with_nalu_size: false,
            extract_in_band_parameter_sets: false,
            max_parameter_set_size: 0xFFFF,
        }
    }
}

impl ReceiverConfig {
    pub fn rewrite_options(&self) -> RewriteOptions {
        RewriteOptions {
            filter_out_sps_pps: self.filter_out_sps_pps,
            filter_out_sei: self.filter_out_sei,
            replace_start_codes_with_nalu_size: self.replace_start_codes_with_nalu_size,
        }
    }
}
