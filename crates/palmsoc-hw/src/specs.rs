/// CPU identification values returned by `MRC p15, 0, Rd, c0, c0, 0`
pub mod cpu {
    /// PXA255, stepping A0
    pub const CPUID_PXA255: u32 = 0x6905_2D06;

    /// PXA260, stepping B1 (reports the same main ID as the PXA255)
    pub const CPUID_PXA260: u32 = 0x6905_2D06;

    /// PXA270, stepping C0
    pub const CPUID_PXA270: u32 = 0x4926_5013;

    /// Cache type register value shared by all supported parts
    pub const CACHE_TYPE: u32 = 0x0B16_A16A;
}

/// Clock specifications
pub mod clock {
    /// Frequency of the OS timer counter (3.6864 MHz)
    pub const OST_HZ: u64 = 3_686_400;

    /// Nominal core clock of a PXA255 (200 MHz)
    pub const PXA255_HZ: u64 = 200_000_000;

    /// Nominal core clock of a PXA263 (400 MHz)
    pub const PXA26X_HZ: u64 = 400_000_000;

    /// Nominal core clock of a PXA270 as configured by Palm firmware (312 MHz)
    pub const PXA270_HZ: u64 = 312_000_000;
}

/// Display specifications
pub mod display {
    /// Width of a hi-res Palm screen in pixels
    pub const HIRES_WIDTH: u16 = 320;

    /// Height of a square hi-res Palm screen in pixels
    pub const HIRES_HEIGHT: u16 = 320;

    /// Height of a hi-res+ (tall) Palm screen in pixels
    pub const HIRES_PLUS_HEIGHT: u16 = 480;

    /// Height of the silkscreen graffiti area on square screens
    pub const GRAFFITI_HEIGHT: u16 = 120;

    /// Framebuffer bytes per pixel for RGB565
    pub const BYTES_PER_PIXEL_16BIT: usize = 2;
}
