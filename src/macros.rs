// src/macros.rs
#[macro_export]
macro_rules! s {
    // String shorthand!

    // Zero-arg → String::new()
    () => {
        ::std::string::String::new()
    };
    // Any single expression: literal, const or var
    ($expr:expr) => {
        ::std::string::String::from($expr)
    };
}

#[macro_export]
macro_rules! join {
    // String-type concatenation shorthand!
    ($first:expr $(, $rest:expr)+ $(,)?) => {{
        let mut s = ::std::string::String::from($first);
        $(
            s.push_str($rest);
        )+
        s
    }};
}

/// Ledger key shorthand: `key!("Name", "World", "Guild")`.
#[macro_export]
macro_rules! key {
    ($subject:expr, $world:expr, $guild:expr $(,)?) => {
        $crate::model::Key::new($subject, $world, $guild)
    };
}

/// VIP key shorthand: `vip_key!("Name", "World")`.
#[macro_export]
macro_rules! vip_key {
    ($subject:expr, $world:expr $(,)?) => {
        $crate::model::VipKey::new($subject, $world)
    };
}
