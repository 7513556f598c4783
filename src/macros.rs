#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

#[macro_export]
macro_rules! re {
    ($pat:literal) => {
        $crate::Pattern::Regex($crate::regex!($pat).clone())
    };
}

/// `node!("kind", [child, ...])`: a kind constraint plus an ordered sequence
/// of named children.
#[macro_export]
macro_rules! node {
    ($kind:expr) => {
        $crate::Pattern::kind($kind)
    };
    ($kind:expr, [ $($child:expr),* $(,)? ]) => {
        $crate::Pattern::All(vec![$crate::Pattern::kind($kind), $crate::Pattern::Seq(vec![ $($child),* ])])
    };
}

#[macro_export]
macro_rules! rule {
    (
        name: $name:expr,
        pattern: $pattern:expr,
        replace: $replace:expr
        $(, scope: $scope:expr)?
        $(, successors: [ $(($to:expr, $capture:expr, $edge:expr)),* $(,)? ])?
        $(, seeded: $seeded:expr)?
        $(, pure: $pure:expr)?
        $(,)?
    ) => {{
        #[allow(unused_mut)]
        let mut rule = $crate::Rule::new($name, $pattern, $replace);
        $( rule.scope = Some($scope); )?
        $( $( rule = rule.then($to, $capture, $edge); )* )?
        $( if $seeded { rule = rule.seeded(); } )?
        $( rule.pure = $pure; )?
        rule
    }};
}
