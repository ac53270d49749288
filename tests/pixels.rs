mod common;

mod tests {
    use myrtio_clockless_rmt::{
        ColorOrder, ControllerState, Error, OrderedPixels, Pin, PixelSource, Rgb, Timing,
    };

    use super::common::{decode, pool, run_show, templates};

    #[test]
    fn test_color_order() {
        let color = Rgb::new(1, 2, 3);
        assert_eq!(ColorOrder::Rgb.apply(color), [1, 2, 3]);
        assert_eq!(ColorOrder::Grb.apply(color), [2, 1, 3]);
        assert_eq!(ColorOrder::Bgr.apply(color), [3, 2, 1]);
        assert_eq!(ColorOrder::default(), ColorOrder::Grb);
    }

    #[test]
    fn test_ordered_pixels_source() {
        let pixels = [Rgb::new(10, 20, 30), Rgb::new(40, 50, 60)];
        let mut source = OrderedPixels::new(&pixels, ColorOrder::Grb);
        assert_eq!(source.remaining(), 2);
        assert_eq!(source.load(), [20, 10, 30]);
        source.advance();
        assert_eq!(source.load(), [50, 40, 60]);
        source.advance();
        assert!(!source.has_more());
    }

    #[test]
    fn test_color_order_reaches_the_wire() {
        let pool = pool(1);
        let id = pool.register(Pin(4), Timing::WS2812).unwrap();
        let pixels = [Rgb::new(0x11, 0x22, 0x33), Rgb::new(0x44, 0x55, 0x66)];
        pool.load(id, &mut OrderedPixels::new(&pixels, ColorOrder::Grb))
            .unwrap();

        pool.begin_show().unwrap();
        run_show(&pool, 100);

        let frames = pool.with_hardware(|hw| hw.frames_for(Pin(4)));
        assert_eq!(frames.len(), 1);
        assert_eq!(
            decode(&frames[0], &templates()),
            [0x22, 0x11, 0x33, 0x55, 0x44, 0x66]
        );
    }

    #[test]
    fn test_overflow_leaves_controller_out_of_show() {
        let pool = pool(2);
        let small = pool.register(Pin(1), Timing::WS2812).unwrap();
        let large = pool.register(Pin(2), Timing::WS2812).unwrap();

        // 64 words hold 256 bytes, 86 pixels need 258
        let too_many = [Rgb::new(1, 1, 1); 86];
        assert_eq!(
            pool.load(large, &mut OrderedPixels::new(&too_many, ColorOrder::Rgb)),
            Err(Error::PixelBufferOverflow {
                bytes: 258,
                capacity: 256,
            })
        );
        pool.load(small, &mut OrderedPixels::new(&[Rgb::new(9, 9, 9)], ColorOrder::Rgb))
            .unwrap();

        assert_eq!(pool.begin_show(), Ok(1));
        let report = run_show(&pool, 100);
        assert_eq!(report.controllers, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(pool.state(large), Ok(ControllerState::Idle));
        assert!(pool.with_hardware(|hw| hw.frames_for(Pin(2)).is_empty()));
    }

    #[test]
    fn test_full_buffer_fits() {
        let pool = pool(1);
        let id = pool.register(Pin(1), Timing::WS2812).unwrap();
        let pixels = [Rgb::new(0xFF, 0x00, 0x80); 85];
        pool.load(id, &mut OrderedPixels::new(&pixels, ColorOrder::Rgb))
            .unwrap();

        pool.begin_show().unwrap();
        run_show(&pool, 100);

        let frames = pool.with_hardware(|hw| hw.frames_for(Pin(1)));
        let bytes = decode(&frames[0], &templates());
        assert_eq!(bytes.len(), 255);
        assert!(bytes.chunks(3).all(|p| p == [0xFF, 0x00, 0x80]));
    }
}
