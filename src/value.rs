//! The [`Scan`] trait: per-type zero checks, string conversion, rendering and
//! descent.
//!
//! Every field type a record can hold implements `Scan`. The built-in impls
//! below cover scalars, durations, collections and pointer types; derived
//! records get theirs from `#[derive(Record)]`. A caller-defined type takes
//! part in resolution by implementing `Scan` itself, which is how custom
//! string formats are plugged into the converter.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use chrono::TimeDelta;

use crate::convert::{self, ConvertError};
use crate::error::LayerfigError;
use crate::meta::Shape;
use crate::units;
use crate::walk::{Segment, Walker};

/// A value the engine can test for zero, assign from resolved content and
/// render into templates.
pub trait Scan {
    /// Type-directed kind used by the document preprocessors.
    fn shape() -> Shape
    where
        Self: Sized;

    /// Whether the value is still the type's zero value ("not yet set").
    fn is_zero(&self) -> bool;

    /// Replace the value with one parsed from resolved content.
    fn scan(&mut self, raw: &[u8]) -> Result<(), ConvertError>;

    /// Text form used by `${.field}` lookups and `ref_from`.
    fn render(&self) -> Option<String> {
        None
    }

    /// Render the value reached by following `path` from here.
    fn render_path(&self, path: &[&str]) -> Option<String> {
        if path.is_empty() { self.render() } else { None }
    }

    /// Descend into nested records. Scalars have nothing to visit.
    fn walk(&mut self, walker: &mut Walker<'_>) -> Result<(), LayerfigError> {
        let _ = walker;
        Ok(())
    }

    #[doc(hidden)]
    fn seq_shape() -> Shape
    where
        Self: Sized,
    {
        Shape::Seq(Self::shape)
    }

    #[doc(hidden)]
    fn scan_seq(seq: &mut Vec<Self>, raw: &[u8]) -> Result<(), ConvertError>
    where
        Self: Sized + Default,
    {
        let mut items = Vec::new();
        for item in convert::split_list(convert::text(raw)?)? {
            let mut value = Self::default();
            value.scan(item.as_bytes())?;
            items.push(value);
        }
        *seq = items;
        Ok(())
    }

    #[doc(hidden)]
    fn render_seq(seq: &[Self]) -> Option<String>
    where
        Self: Sized,
    {
        seq.iter()
            .map(Scan::render)
            .collect::<Option<Vec<_>>>()
            .map(|items| items.join(","))
    }
}

impl Scan for String {
    fn shape() -> Shape {
        Shape::Text
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn scan(&mut self, raw: &[u8]) -> Result<(), ConvertError> {
        *self = convert::text(raw)?.to_string();
        Ok(())
    }

    fn render(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl Scan for PathBuf {
    fn shape() -> Shape {
        Shape::Text
    }

    fn is_zero(&self) -> bool {
        self.as_os_str().is_empty()
    }

    fn scan(&mut self, raw: &[u8]) -> Result<(), ConvertError> {
        *self = PathBuf::from(convert::text(raw)?);
        Ok(())
    }

    fn render(&self) -> Option<String> {
        Some(self.to_string_lossy().into_owned())
    }
}

impl Scan for bool {
    fn shape() -> Shape {
        Shape::Bool
    }

    fn is_zero(&self) -> bool {
        !*self
    }

    fn scan(&mut self, raw: &[u8]) -> Result<(), ConvertError> {
        if convert::is_blank(raw) {
            *self = false;
            return Ok(());
        }
        *self = convert::parse_bool(convert::text(raw)?)?;
        Ok(())
    }

    fn render(&self) -> Option<String> {
        Some(self.to_string())
    }
}

macro_rules! scan_integer {
    ($($ty:ty),* $(,)?) => {$(
        impl Scan for $ty {
            fn shape() -> Shape {
                Shape::Integer
            }

            fn is_zero(&self) -> bool {
                *self == 0
            }

            fn scan(&mut self, raw: &[u8]) -> Result<(), ConvertError> {
                if convert::is_blank(raw) {
                    *self = 0;
                    return Ok(());
                }
                *self = convert::parse_integer::<$ty>(convert::text(raw)?, stringify!($ty))?;
                Ok(())
            }

            fn render(&self) -> Option<String> {
                Some(self.to_string())
            }
        }
    )*};
}

scan_integer!(i16, i32, i64, i128, isize, u16, u32, u64, u128, usize);

// `u8` and `i8` are spelled out so `Vec<u8>` can take raw bytes verbatim.
impl Scan for u8 {
    fn shape() -> Shape {
        Shape::Integer
    }

    fn is_zero(&self) -> bool {
        *self == 0
    }

    fn scan(&mut self, raw: &[u8]) -> Result<(), ConvertError> {
        if convert::is_blank(raw) {
            *self = 0;
            return Ok(());
        }
        *self = convert::parse_integer::<u8>(convert::text(raw)?, "u8")?;
        Ok(())
    }

    fn render(&self) -> Option<String> {
        Some(self.to_string())
    }

    fn seq_shape() -> Shape {
        Shape::Bytes
    }

    fn scan_seq(seq: &mut Vec<Self>, raw: &[u8]) -> Result<(), ConvertError> {
        *seq = raw.to_vec();
        Ok(())
    }

    fn render_seq(seq: &[Self]) -> Option<String> {
        String::from_utf8(seq.to_vec()).ok()
    }
}

impl Scan for i8 {
    fn shape() -> Shape {
        Shape::Integer
    }

    fn is_zero(&self) -> bool {
        *self == 0
    }

    fn scan(&mut self, raw: &[u8]) -> Result<(), ConvertError> {
        if convert::is_blank(raw) {
            *self = 0;
            return Ok(());
        }
        *self = convert::parse_integer::<i8>(convert::text(raw)?, "i8")?;
        Ok(())
    }

    fn render(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl Scan for f64 {
    fn shape() -> Shape {
        Shape::Float
    }

    fn is_zero(&self) -> bool {
        *self == 0.0
    }

    fn scan(&mut self, raw: &[u8]) -> Result<(), ConvertError> {
        if convert::is_blank(raw) {
            *self = 0.0;
            return Ok(());
        }
        *self = convert::parse_f64(convert::text(raw)?)?;
        Ok(())
    }

    fn render(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl Scan for f32 {
    fn shape() -> Shape {
        Shape::Float
    }

    fn is_zero(&self) -> bool {
        *self == 0.0
    }

    fn scan(&mut self, raw: &[u8]) -> Result<(), ConvertError> {
        if convert::is_blank(raw) {
            *self = 0.0;
            return Ok(());
        }
        *self = convert::parse_f32(convert::text(raw)?)?;
        Ok(())
    }

    fn render(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl Scan for TimeDelta {
    fn shape() -> Shape {
        Shape::Duration
    }

    fn is_zero(&self) -> bool {
        TimeDelta::is_zero(self)
    }

    fn scan(&mut self, raw: &[u8]) -> Result<(), ConvertError> {
        if convert::is_blank(raw) {
            *self = TimeDelta::zero();
            return Ok(());
        }
        *self = units::parse_duration(convert::text(raw)?)?;
        Ok(())
    }

    fn render(&self) -> Option<String> {
        Some(units::format_duration(*self))
    }
}

impl Scan for Duration {
    fn shape() -> Shape {
        Shape::Duration
    }

    fn is_zero(&self) -> bool {
        Duration::is_zero(self)
    }

    fn scan(&mut self, raw: &[u8]) -> Result<(), ConvertError> {
        if convert::is_blank(raw) {
            *self = Duration::ZERO;
            return Ok(());
        }
        let text = convert::text(raw)?;
        let delta = units::parse_duration(text)?;
        *self = delta
            .to_std()
            .map_err(|_| ConvertError::invalid(text, "Duration", "negative durations are not allowed"))?;
        Ok(())
    }

    fn render(&self) -> Option<String> {
        TimeDelta::from_std(*self).ok().map(units::format_duration)
    }
}

impl<T> Scan for Vec<T>
where
    T: Scan + Default,
{
    fn shape() -> Shape {
        T::seq_shape()
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn scan(&mut self, raw: &[u8]) -> Result<(), ConvertError> {
        T::scan_seq(self, raw)
    }

    fn render(&self) -> Option<String> {
        T::render_seq(self)
    }

    fn render_path(&self, path: &[&str]) -> Option<String> {
        match path.split_first() {
            None => self.render(),
            Some((index, rest)) => self.get(index.parse::<usize>().ok()?)?.render_path(rest),
        }
    }

    fn walk(&mut self, walker: &mut Walker<'_>) -> Result<(), LayerfigError> {
        for (index, item) in self.iter_mut().enumerate() {
            walker.with_segment(Segment::Index(index), |w| item.walk(w))?;
        }
        Ok(())
    }
}

fn scan_pairs<K, V>(raw: &[u8], mut insert: impl FnMut(K, V)) -> Result<(), ConvertError>
where
    K: Scan + Default,
    V: Scan + Default,
{
    for (key_text, value_text) in convert::split_pairs(convert::text(raw)?)? {
        let mut key = K::default();
        key.scan(key_text.as_bytes())?;
        let mut value = V::default();
        value.scan(value_text.as_bytes())?;
        insert(key, value);
    }
    Ok(())
}

impl<K, V, S> Scan for HashMap<K, V, S>
where
    K: Scan + Default + Eq + Hash,
    V: Scan + Default,
    S: std::hash::BuildHasher + Default,
{
    fn shape() -> Shape {
        Shape::Map(V::shape)
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn scan(&mut self, raw: &[u8]) -> Result<(), ConvertError> {
        let mut map = HashMap::with_hasher(S::default());
        scan_pairs(raw, |k, v| {
            map.insert(k, v);
        })?;
        *self = map;
        Ok(())
    }

    fn render_path(&self, path: &[&str]) -> Option<String> {
        let (key, rest) = path.split_first()?;
        self.iter()
            .find(|(k, _)| k.render().as_deref() == Some(*key))
            .and_then(|(_, v)| v.render_path(rest))
    }

    fn walk(&mut self, walker: &mut Walker<'_>) -> Result<(), LayerfigError> {
        for (key, value) in self.iter_mut() {
            let segment = Segment::Key(key.render().unwrap_or_default());
            walker.with_segment(segment, |w| value.walk(w))?;
        }
        Ok(())
    }
}

impl<K, V> Scan for BTreeMap<K, V>
where
    K: Scan + Default + Ord,
    V: Scan + Default,
{
    fn shape() -> Shape {
        Shape::Map(V::shape)
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn scan(&mut self, raw: &[u8]) -> Result<(), ConvertError> {
        let mut map = BTreeMap::new();
        scan_pairs(raw, |k, v| {
            map.insert(k, v);
        })?;
        *self = map;
        Ok(())
    }

    fn render_path(&self, path: &[&str]) -> Option<String> {
        let (key, rest) = path.split_first()?;
        self.iter()
            .find(|(k, _)| k.render().as_deref() == Some(*key))
            .and_then(|(_, v)| v.render_path(rest))
    }

    fn walk(&mut self, walker: &mut Walker<'_>) -> Result<(), LayerfigError> {
        for (key, value) in self.iter_mut() {
            let segment = Segment::Key(key.render().unwrap_or_default());
            walker.with_segment(segment, |w| value.walk(w))?;
        }
        Ok(())
    }
}

/// `None` is an unset pointer: never walked, zero, and filled with a fresh
/// value when a source assigns to it.
impl<T> Scan for Option<T>
where
    T: Scan + Default,
{
    fn shape() -> Shape {
        T::shape()
    }

    fn is_zero(&self) -> bool {
        self.is_none()
    }

    fn scan(&mut self, raw: &[u8]) -> Result<(), ConvertError> {
        let mut value = T::default();
        value.scan(raw)?;
        *self = Some(value);
        Ok(())
    }

    fn render(&self) -> Option<String> {
        self.as_ref().and_then(Scan::render)
    }

    fn render_path(&self, path: &[&str]) -> Option<String> {
        self.as_ref().and_then(|v| v.render_path(path))
    }

    fn walk(&mut self, walker: &mut Walker<'_>) -> Result<(), LayerfigError> {
        match self {
            Some(value) => value.walk(walker),
            None => Ok(()),
        }
    }
}

impl<T> Scan for Box<T>
where
    T: Scan,
{
    fn shape() -> Shape {
        T::shape()
    }

    fn is_zero(&self) -> bool {
        (**self).is_zero()
    }

    fn scan(&mut self, raw: &[u8]) -> Result<(), ConvertError> {
        (**self).scan(raw)
    }

    fn render(&self) -> Option<String> {
        (**self).render()
    }

    fn render_path(&self, path: &[&str]) -> Option<String> {
        (**self).render_path(path)
    }

    fn walk(&mut self, walker: &mut Walker<'_>) -> Result<(), LayerfigError> {
        if size_of::<T>() > 0 {
            let address = &**self as *const T as *const () as usize;
            walker.enter_pointer(address, std::any::type_name::<T>())?;
        }
        (**self).walk(walker)
    }
}

/// Shared nodes are the one way a record graph can contain a cycle; the
/// walker rejects any node reached twice.
impl<T> Scan for Rc<RefCell<T>>
where
    T: Scan,
{
    fn shape() -> Shape {
        T::shape()
    }

    fn is_zero(&self) -> bool {
        self.try_borrow().map(|v| v.is_zero()).unwrap_or(false)
    }

    fn scan(&mut self, raw: &[u8]) -> Result<(), ConvertError> {
        match self.try_borrow_mut() {
            Ok(mut value) => value.scan(raw),
            Err(_) => Err(ConvertError::Unsupported {
                type_name: std::any::type_name::<T>(),
            }),
        }
    }

    fn render(&self) -> Option<String> {
        self.try_borrow().ok().and_then(|v| v.render())
    }

    fn render_path(&self, path: &[&str]) -> Option<String> {
        self.try_borrow().ok().and_then(|v| v.render_path(path))
    }

    fn walk(&mut self, walker: &mut Walker<'_>) -> Result<(), LayerfigError> {
        let type_name = std::any::type_name::<T>();
        walker.enter_pointer(Rc::as_ptr(self) as *const () as usize, type_name)?;
        let mut value = self
            .try_borrow_mut()
            .map_err(|_| walker.cycle_error(type_name))?;
        value.walk(walker)
    }
}

/// Implement [`Scan`] for a type through its `FromStr` and `Display` impls.
///
/// The type must also be `Default + PartialEq`; the default value is treated
/// as zero.
///
/// ```ignore
/// layerfig::scan_from_str!(LogLevel);
/// ```
#[macro_export]
macro_rules! scan_from_str {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::Scan for $ty {
            fn shape() -> $crate::meta::Shape {
                $crate::meta::Shape::Text
            }

            fn is_zero(&self) -> bool {
                *self == <$ty as ::std::default::Default>::default()
            }

            fn scan(&mut self, raw: &[u8]) -> ::std::result::Result<(), $crate::ConvertError> {
                let text = $crate::convert::text(raw)?;
                *self = text
                    .trim()
                    .parse::<$ty>()
                    .map_err($crate::ConvertError::custom)?;
                Ok(())
            }

            fn render(&self) -> ::std::option::Option<::std::string::String> {
                Some(::std::string::ToString::to_string(self))
            }
        }
    )+};
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanned<T: Scan + Default>(raw: &str) -> T {
        let mut value = T::default();
        value.scan(raw.as_bytes()).unwrap();
        value
    }

    #[test]
    fn zero_values() {
        assert!(String::new().is_zero());
        assert!(0u16.is_zero());
        assert!(false.is_zero());
        assert!(!true.is_zero());
        assert!(Vec::<String>::new().is_zero());
        assert!(None::<u8>.is_zero());
        assert!(!Some(0u8).is_zero());
        assert!(Duration::ZERO.is_zero());
    }

    #[test]
    fn scalars_scan() {
        assert_eq!(scanned::<String>("hello"), "hello");
        assert_eq!(scanned::<u16>("8080"), 8080);
        assert!(scanned::<bool>("true"));
        assert_eq!(scanned::<f64>("2.5"), 2.5);
        assert_eq!(scanned::<PathBuf>("/etc/app"), PathBuf::from("/etc/app"));
    }

    #[test]
    fn blank_content_is_the_zero_value() {
        let mut port = 8080u16;
        port.scan(b"").unwrap();
        assert_eq!(port, 0);
        let mut flag = true;
        flag.scan(b"  ").unwrap();
        assert!(!flag);
        let mut ratio = 0.5f64;
        ratio.scan(b"").unwrap();
        assert_eq!(ratio, 0.0);
        let mut timeout = Duration::from_secs(5);
        timeout.scan(b"\n").unwrap();
        assert!(timeout.is_zero());
        let mut skew = TimeDelta::hours(1);
        skew.scan(b"").unwrap();
        assert!(skew.is_zero());
    }

    #[test]
    fn u8_overflow_is_error() {
        let mut port = 0u8;
        assert!(port.scan(b"256").is_err());
        port.scan(b"255").unwrap();
        assert_eq!(port, 255);
    }

    #[test]
    fn durations() {
        assert_eq!(scanned::<Duration>("2d"), Duration::from_secs(48 * 3600));
        assert_eq!(scanned::<TimeDelta>("-1d"), TimeDelta::hours(-24));
        let mut d = Duration::ZERO;
        assert!(d.scan(b"-1h").is_err());
    }

    #[test]
    fn bytes_are_verbatim() {
        let raw = [0xff, 0x00, b',', 0xfe];
        let mut bytes: Vec<u8> = Vec::new();
        bytes.scan(&raw).unwrap();
        assert_eq!(bytes, raw);
        assert!(matches!(Vec::<u8>::shape(), Shape::Bytes));
        assert_eq!(bytes.render(), None);
    }

    #[test]
    fn string_rejects_invalid_utf8() {
        let mut s = String::new();
        assert!(matches!(s.scan(&[0xff]), Err(ConvertError::NotUtf8)));
    }

    #[test]
    fn lists_and_maps() {
        assert_eq!(scanned::<Vec<u32>>("1,2,3"), vec![1, 2, 3]);
        assert_eq!(
            scanned::<Vec<String>>(r#"a,"b,c""#),
            vec!["a".to_string(), "b,c".to_string()]
        );
        let map = scanned::<HashMap<String, u16>>("web:80,tls:443");
        assert_eq!(map["web"], 80);
        assert_eq!(map["tls"], 443);
        let sorted = scanned::<BTreeMap<String, String>>("b:2,a:1");
        assert_eq!(sorted.keys().collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn option_allocates_on_scan() {
        let mut port: Option<u16> = None;
        port.scan(b"5432").unwrap();
        assert_eq!(port, Some(5432));
    }

    #[test]
    fn render_paths_through_collections() {
        let list = vec!["a".to_string(), "b".to_string()];
        assert_eq!(list.render_path(&["1"]), Some("b".into()));
        assert_eq!(list.render(), Some("a,b".into()));
        let map: BTreeMap<String, u16> = [("web".to_string(), 80)].into_iter().collect();
        assert_eq!(map.render_path(&["web"]), Some("80".into()));
        assert_eq!(map.render_path(&["db"]), None);
    }

    #[derive(Debug, Default, PartialEq)]
    enum Level {
        #[default]
        Info,
        Debug,
    }

    impl std::str::FromStr for Level {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s {
                "info" => Ok(Level::Info),
                "debug" => Ok(Level::Debug),
                other => Err(format!("unknown level {other}")),
            }
        }
    }

    impl std::fmt::Display for Level {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Level::Info => f.write_str("info"),
                Level::Debug => f.write_str("debug"),
            }
        }
    }

    crate::scan_from_str!(Level);

    #[test]
    fn custom_scan_via_from_str() {
        assert_eq!(scanned::<Level>("debug"), Level::Debug);
        assert!(Level::Info.is_zero());
        let mut level = Level::Info;
        let err = level.scan(b"loud").unwrap_err();
        assert!(err.to_string().contains("unknown level"));
    }
}
